use crate::error::EiscpError;

pub const MAGIC: &[u8; 4] = b"ISCP";
pub const HEADER_SIZE: usize = 16;
pub const PROTOCOL_VERSION: u8 = 0x01;

pub type FrameHeaderBytes = [u8; HEADER_SIZE];

/// The fixed 16-byte envelope that precedes every eISCP payload.
///
/// ```text
/// "ISCP" | header size (u32 BE) | data size (u32 BE) | version | 3 reserved
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    header_size: u32,
    data_size: u32,
    version: u8,
}

impl FrameHeader {
    pub fn new(data_size: u32) -> Self {
        Self {
            header_size: HEADER_SIZE as u32,
            data_size,
            version: PROTOCOL_VERSION,
        }
    }

    pub fn to_bytes(&self) -> FrameHeaderBytes {
        let mut header: FrameHeaderBytes = [0; HEADER_SIZE];
        header[0..4].copy_from_slice(MAGIC);
        header[4..8].copy_from_slice(&self.header_size.to_be_bytes());
        header[8..12].copy_from_slice(&self.data_size.to_be_bytes());
        header[12] = self.version;
        header
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, EiscpError> {
        let Some(bytes) = bytes.get(..HEADER_SIZE) else {
            return Err(EiscpError::InvalidHeader("header truncated"));
        };
        if &bytes[0..4] != MAGIC {
            return Err(EiscpError::InvalidHeader("missing ISCP magic"));
        }
        let header_size = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let data_size = u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
        if (header_size as usize) < HEADER_SIZE {
            return Err(EiscpError::InvalidHeader("header size below 16"));
        }
        Ok(Self {
            header_size,
            data_size,
            version: bytes[12],
        })
    }

    pub fn header_size(&self) -> u32 {
        self.header_size
    }

    pub fn data_size(&self) -> u32 {
        self.data_size
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    /// Total frame length on the wire, header included.
    pub fn frame_len(&self) -> usize {
        self.header_size as usize + self.data_size as usize
    }
}
