use thiserror::Error;

/// Which codec every datagram passes through, symmetrically on both ends.
/// Selected once before the host is created; both sides must agree.
#[derive(Copy, Debug, Clone, Eq, PartialEq, Default)]
pub enum CompressionMode {
    /// Identity; datagrams travel as assembled
    #[default]
    None,
    /// LZ4 block compression: cheap, modest ratios
    Lz4,
    /// Zstandard: better ratios at a higher CPU cost
    Zstd,
}

/// Errors raised while setting up or running the datagram codec
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompressionError {
    /// The compressor could not be created
    #[error("Failed to create compressor for {mode:?}")]
    CompressorCreationFailed { mode: CompressionMode },

    /// The decompressor could not be created
    #[error("Failed to create decompressor for {mode:?}")]
    DecompressorCreationFailed { mode: CompressionMode },

    /// Compression of an outbound datagram failed
    #[error("Failed to compress payload of {payload_size} byte(s)")]
    CompressionFailed { payload_size: usize },

    /// Decompression failed; the datagram is malformed or not compressed
    /// with the agreed codec
    #[error("Failed to decompress payload of {payload_size} byte(s)")]
    DecompressionFailed { payload_size: usize },

    /// The decompressed size exceeds the negotiated maximum packet size
    #[error("Decompressed payload of {size} byte(s) exceeds the maximum ({max})")]
    DecompressedTooLarge { size: usize, max: usize },
}

/// Compresses outbound datagrams according to the configured mode
pub struct Encoder {
    mode: CompressionMode,
    zstd: Option<zstd::bulk::Compressor<'static>>,
}

impl Encoder {
    pub fn try_new(mode: CompressionMode) -> Result<Self, CompressionError> {
        let zstd = match mode {
            CompressionMode::Zstd => Some(
                zstd::bulk::Compressor::new(zstd::DEFAULT_COMPRESSION_LEVEL)
                    .map_err(|_| CompressionError::CompressorCreationFailed { mode })?,
            ),
            _ => None,
        };
        Ok(Self { mode, zstd })
    }

    pub fn encode(&mut self, payload: &[u8]) -> Result<Vec<u8>, CompressionError> {
        match self.mode {
            CompressionMode::None => Ok(payload.to_vec()),
            CompressionMode::Lz4 => Ok(lz4_flex::compress_prepend_size(payload)),
            CompressionMode::Zstd => {
                let compressor = self.zstd.as_mut().ok_or(
                    CompressionError::CompressorCreationFailed { mode: self.mode },
                )?;
                compressor
                    .compress(payload)
                    .map_err(|_| CompressionError::CompressionFailed {
                        payload_size: payload.len(),
                    })
            }
        }
    }
}

/// Decompresses inbound datagrams, bounding the inflated size so a
/// malicious peer cannot balloon memory
pub struct Decoder {
    mode: CompressionMode,
    zstd: Option<zstd::bulk::Decompressor<'static>>,
    max_size: usize,
}

impl Decoder {
    pub fn try_new(mode: CompressionMode, max_size: usize) -> Result<Self, CompressionError> {
        let zstd = match mode {
            CompressionMode::Zstd => Some(
                zstd::bulk::Decompressor::new()
                    .map_err(|_| CompressionError::DecompressorCreationFailed { mode })?,
            ),
            _ => None,
        };
        Ok(Self {
            mode,
            zstd,
            max_size,
        })
    }

    pub fn decode(&mut self, payload: &[u8]) -> Result<Vec<u8>, CompressionError> {
        match self.mode {
            CompressionMode::None => Ok(payload.to_vec()),
            CompressionMode::Lz4 => {
                let result = lz4_flex::decompress_size_prepended(payload).map_err(|_| {
                    CompressionError::DecompressionFailed {
                        payload_size: payload.len(),
                    }
                })?;
                if result.len() > self.max_size {
                    return Err(CompressionError::DecompressedTooLarge {
                        size: result.len(),
                        max: self.max_size,
                    });
                }
                Ok(result)
            }
            CompressionMode::Zstd => {
                let decompressor = self.zstd.as_mut().ok_or(
                    CompressionError::DecompressorCreationFailed { mode: self.mode },
                )?;
                decompressor
                    .decompress(payload, self.max_size)
                    .map_err(|_| CompressionError::DecompressionFailed {
                        payload_size: payload.len(),
                    })
            }
        }
    }
}
