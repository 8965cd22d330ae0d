// Wrapping u16 sequence arithmetic for per-channel packet numbering

/// Returns whether a wrapping sequence number is greater than another.
/// sequence_greater_than(2,1) is true, sequence_greater_than(1,2) is false,
/// equality is false.
pub fn sequence_greater_than(s1: u16, s2: u16) -> bool {
    ((s1 > s2) && (s1 - s2 <= 32768)) || ((s1 < s2) && (s2 - s1 > 32768))
}

/// Returns whether a wrapping sequence number is less than another
pub fn sequence_less_than(s1: u16, s2: u16) -> bool {
    sequence_greater_than(s2, s1)
}
