// The simplify/confirm handshake as observed on the wire: first use of an
// address offers the full path, and the id form only appears once the
// receiving peer has confirmed it.

mod common;

use common::{make_engine, LoopbackHub, TestTree};
use treelink_shared::{ByteReader, NetworkCommand, RpcMode};

#[test]
fn first_call_offers_the_path_then_switches_to_the_id_form() {
    let hub = LoopbackHub::new();
    let mut a = make_engine(&hub, 1);
    let mut b = make_engine(&hub, 2);

    let mut tree_a = TestTree::new();
    let lobby_a = tree_a.add_node("/root/Lobby", 1);
    tree_a.set_rpc_mode(lobby_a, "ping", RpcMode::Remote);

    let mut tree_b = TestTree::new();
    let lobby_b = tree_b.add_node("/root/Lobby", 1);
    tree_b.set_rpc_mode(lobby_b, "ping", RpcMode::Remote);

    a.poll(&mut tree_a).unwrap();
    b.poll(&mut tree_b).unwrap();
    hub.clear_traffic();

    // first call toward (address, peer 2)
    a.rpcp(&mut tree_a, lobby_a, 2, false, "ping", &[]).unwrap();

    let traffic = hub.traffic();
    assert_eq!(traffic.len(), 2);
    assert_eq!(traffic[0].command(), NetworkCommand::SimplifyPath.to_byte());
    assert_eq!(traffic[1].command(), NetworkCommand::RemoteCall.to_byte());
    // peer 2 has not confirmed yet, so the call still carries the full path
    assert_eq!(traffic[1].bytes[1], 0);

    // the offer names the address and its assigned id
    let mut reader = ByteReader::new(&traffic[0].bytes[1..]);
    assert_eq!(reader.read_string().unwrap(), "/root/Lobby");
    let offered_id = reader.read_varint().unwrap();

    b.poll(&mut tree_b).unwrap();
    assert_eq!(tree_b.node(lobby_b).calls.len(), 1);
    assert_eq!(tree_b.node(lobby_b).calls[0].0, "ping");
    assert!(tree_b.node(lobby_b).calls[0].1.is_empty());

    // B's confirmation reaches A
    a.poll(&mut tree_a).unwrap();

    hub.clear_traffic();
    a.rpcp(&mut tree_a, lobby_a, 2, false, "ping", &[]).unwrap();

    let traffic = hub.traffic();
    assert_eq!(traffic.len(), 1);
    assert_eq!(traffic[0].command(), NetworkCommand::RemoteCall.to_byte());
    assert_eq!(traffic[0].bytes[1], 1);
    let mut reader = ByteReader::new(&traffic[0].bytes[2..]);
    assert_eq!(reader.read_varint().unwrap(), offered_id);

    b.poll(&mut tree_b).unwrap();
    assert_eq!(tree_b.node(lobby_b).calls.len(), 2);
}

#[test]
fn arguments_survive_the_trip() {
    let hub = LoopbackHub::new();
    let mut a = make_engine(&hub, 1);
    let mut b = make_engine(&hub, 2);

    let mut tree_a = TestTree::new();
    let node_a = tree_a.add_node("/root/Game", 1);
    tree_a.set_rpc_mode(node_a, "spawn", RpcMode::Remote);

    let mut tree_b = TestTree::new();
    let node_b = tree_b.add_node("/root/Game", 1);
    tree_b.set_rpc_mode(node_b, "spawn", RpcMode::Remote);

    a.poll(&mut tree_a).unwrap();
    b.poll(&mut tree_b).unwrap();

    a.rpcp(&mut tree_a, node_a, 2, false, "spawn", &[b"orc", &[0x01, 0x02]])
        .unwrap();
    b.poll(&mut tree_b).unwrap();

    let calls = &tree_b.node(node_b).calls;
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].0, "spawn");
    assert_eq!(calls[0].1, vec![b"orc".to_vec(), vec![0x01, 0x02]]);
}

#[test]
fn rsetp_reuses_the_same_cache_entry_as_rpcp() {
    let hub = LoopbackHub::new();
    let mut a = make_engine(&hub, 1);
    let mut b = make_engine(&hub, 2);

    let mut tree_a = TestTree::new();
    let node_a = tree_a.add_node("/root/Score", 1);
    tree_a.set_rpc_mode(node_a, "reset", RpcMode::Remote);
    tree_a.set_rset_mode(node_a, "points", RpcMode::Remote);

    let mut tree_b = TestTree::new();
    let node_b = tree_b.add_node("/root/Score", 1);
    tree_b.set_rpc_mode(node_b, "reset", RpcMode::Remote);
    tree_b.set_rset_mode(node_b, "points", RpcMode::Remote);

    a.poll(&mut tree_a).unwrap();
    b.poll(&mut tree_b).unwrap();

    a.rpcp(&mut tree_a, node_a, 2, false, "reset", &[]).unwrap();
    b.poll(&mut tree_b).unwrap();
    a.poll(&mut tree_a).unwrap();

    hub.clear_traffic();
    a.rsetp(&mut tree_a, node_a, 2, false, "points", &[0x2A])
        .unwrap();

    // the address is already confirmed, so no second offer goes out
    let traffic = hub.traffic();
    assert_eq!(traffic.len(), 1);
    assert_eq!(traffic[0].command(), NetworkCommand::RemoteSet.to_byte());
    assert_eq!(traffic[0].bytes[1], 1);

    b.poll(&mut tree_b).unwrap();
    let sets = &tree_b.node(node_b).sets;
    assert_eq!(sets.len(), 1);
    assert_eq!(sets[0].0, "points");
    assert_eq!(sets[0].1, vec![0x2A]);
}

#[test]
fn path_ids_are_unique_and_stable_per_process() {
    let hub = LoopbackHub::new();
    let mut a = make_engine(&hub, 1);
    let mut b = make_engine(&hub, 2);

    let mut tree_a = TestTree::new();
    let lobby = tree_a.add_node("/root/Lobby", 1);
    let arena = tree_a.add_node("/root/Arena", 1);
    tree_a.set_rpc_mode(lobby, "ping", RpcMode::Remote);
    tree_a.set_rpc_mode(arena, "ping", RpcMode::Remote);

    let mut tree_b = TestTree::new();
    tree_b.add_node("/root/Lobby", 1);
    tree_b.add_node("/root/Arena", 1);
    for handle in [tree_b.resolve_handle("/root/Lobby"), tree_b.resolve_handle("/root/Arena")] {
        tree_b.set_rpc_mode(handle, "ping", RpcMode::Remote);
    }

    a.poll(&mut tree_a).unwrap();
    b.poll(&mut tree_b).unwrap();
    hub.clear_traffic();

    a.rpcp(&mut tree_a, lobby, 2, false, "ping", &[]).unwrap();
    a.rpcp(&mut tree_a, arena, 2, false, "ping", &[]).unwrap();
    a.rpcp(&mut tree_a, lobby, 2, false, "ping", &[]).unwrap();

    let offers: Vec<(String, u32)> = hub
        .traffic()
        .iter()
        .filter(|record| record.command() == NetworkCommand::SimplifyPath.to_byte())
        .map(|record| {
            let mut reader = ByteReader::new(&record.bytes[1..]);
            let path = reader.read_string().unwrap().to_string();
            let id = reader.read_varint().unwrap();
            (path, id)
        })
        .collect();

    // one offer per distinct address, each with its own id
    assert_eq!(offers.len(), 2);
    assert_eq!(offers[0].0, "/root/Lobby");
    assert_eq!(offers[1].0, "/root/Arena");
    assert_ne!(offers[0].1, offers[1].1);
}

#[test]
fn confirmation_state_is_independent_per_peer() {
    let hub = LoopbackHub::new();
    let mut a = make_engine(&hub, 1);
    let mut b = make_engine(&hub, 2);
    let mut c = make_engine(&hub, 3);

    let mut tree_a = TestTree::new();
    let node_a = tree_a.add_node("/root/Lobby", 1);
    tree_a.set_rpc_mode(node_a, "ping", RpcMode::Remote);

    let mut tree_b = TestTree::new();
    let node_b = tree_b.add_node("/root/Lobby", 1);
    tree_b.set_rpc_mode(node_b, "ping", RpcMode::Remote);

    let mut tree_c = TestTree::new();
    let node_c = tree_c.add_node("/root/Lobby", 1);
    tree_c.set_rpc_mode(node_c, "ping", RpcMode::Remote);

    a.poll(&mut tree_a).unwrap();
    b.poll(&mut tree_b).unwrap();
    c.poll(&mut tree_c).unwrap();

    // handshake completes with peer 2 only
    a.rpcp(&mut tree_a, node_a, 2, false, "ping", &[]).unwrap();
    b.poll(&mut tree_b).unwrap();
    a.poll(&mut tree_a).unwrap();

    // peer 3 has confirmed nothing: its first call must re-offer and use the
    // full path, even though peer 2 already confirmed this address
    hub.clear_traffic();
    a.rpcp(&mut tree_a, node_a, 3, false, "ping", &[]).unwrap();

    let traffic = hub.traffic();
    assert_eq!(traffic.len(), 2);
    assert_eq!(traffic[0].command(), NetworkCommand::SimplifyPath.to_byte());
    assert_eq!(traffic[0].to, 3);
    assert_eq!(traffic[1].command(), NetworkCommand::RemoteCall.to_byte());
    assert_eq!(traffic[1].bytes[1], 0);

    c.poll(&mut tree_c).unwrap();
    assert_eq!(tree_c.node(node_c).calls.len(), 1);
}
