//! Unsigned LEB128, matching the original's `WriteUvarint` (Go's
//! `binary.PutUvarint`). Small enough that pulling in a dedicated crate
//! for it isn't worth the dependency.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub async fn write_uvarint<W: AsyncWrite + Unpin>(w: &mut W, mut value: u64) -> std::io::Result<()> {
    loop {
        let mut byte = (value & 0x7f) as u8;
        value >>= 7;
        if value != 0 {
            byte |= 0x80;
        }
        w.write_u8(byte).await?;
        if value == 0 {
            break;
        }
    }
    Ok(())
}

pub async fn read_uvarint<R: AsyncRead + Unpin>(r: &mut R) -> std::io::Result<u64> {
    let mut result: u64 = 0;
    let mut shift = 0u32;
    loop {
        let byte = r.read_u8().await?;
        result |= ((byte & 0x7f) as u64) << shift;
        if byte & 0x80 == 0 {
            break;
        }
        shift += 7;
        if shift >= 64 {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "uvarint too long",
            ));
        }
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_a_range_of_values() {
        for value in [0u64, 1, 127, 128, 300, u32::MAX as u64, u64::MAX] {
            let mut buf = Vec::new();
            write_uvarint(&mut buf, value).await.unwrap();
            let mut cursor = std::io::Cursor::new(buf);
            let decoded = read_uvarint(&mut cursor).await.unwrap();
            assert_eq!(decoded, value);
        }
    }
}
