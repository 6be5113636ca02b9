//! 模型二进制头部结构检查

use std::io::Cursor;

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};

use super::ModelConsistencyCheck;

const MAGIC: &[u8; 4] = b"MOC3";
const HEADER_SIZE: usize = 64;
/// 段偏移表中参与检查的项数
const CHECKED_SECTIONS: usize = 8;

/// 校验 moc3 头部：魔数、版本、字节序标志、段偏移表均落在文件内
#[derive(Clone, Copy, Debug)]
pub struct MocHeaderCheck {
    pub max_version: u8,
}

impl Default for MocHeaderCheck {
    fn default() -> Self {
        Self { max_version: 6 }
    }
}

impl MocHeaderCheck {
    fn read_offsets<B: byteorder::ByteOrder>(bytes: &[u8]) -> Option<Vec<u32>> {
        let available = (bytes.len() - HEADER_SIZE) / 4;
        let count = available.min(CHECKED_SECTIONS);
        let mut cursor = Cursor::new(&bytes[HEADER_SIZE..]);
        let mut offsets = Vec::with_capacity(count);
        for _ in 0..count {
            offsets.push(cursor.read_u32::<B>().ok()?);
        }
        Some(offsets)
    }
}

impl ModelConsistencyCheck for MocHeaderCheck {
    fn is_consistent(&self, bytes: &[u8]) -> bool {
        if bytes.len() < HEADER_SIZE + 4 || &bytes[0..4] != MAGIC {
            return false;
        }

        let version = bytes[4];
        if version == 0 || version > self.max_version {
            log::debug!("unsupported moc version {}", version);
            return false;
        }

        let offsets = match bytes[5] {
            0 => Self::read_offsets::<LittleEndian>(bytes),
            1 => Self::read_offsets::<BigEndian>(bytes),
            _ => None,
        };
        let Some(offsets) = offsets else {
            return false;
        };

        // 第一项（计数信息表）必须存在
        if offsets.first().copied().unwrap_or(0) == 0 {
            return false;
        }

        let len = bytes.len() as u64;
        offsets
            .iter()
            .all(|&o| o == 0 || (o as u64 >= HEADER_SIZE as u64 && (o as u64) < len))
    }
}
