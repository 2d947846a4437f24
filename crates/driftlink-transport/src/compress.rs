//! Brotli compression glue (spec §6): quality 10, text mode, size hint set
//! to the serialized length.

use std::io::Write;

use crate::error::DriftlinkError;

const QUALITY: i32 = 10;
const LG_WINDOW: i32 = 22;

pub fn compress(data: &[u8]) -> Result<Vec<u8>, DriftlinkError> {
    let mut out = Vec::new();
    {
        let params = brotli::enc::BrotliEncoderParams {
            quality: QUALITY,
            lgwin: LG_WINDOW,
            size_hint: data.len(),
            mode: brotli::enc::BrotliEncoderMode::BROTLI_MODE_TEXT,
            ..Default::default()
        };
        let mut writer = brotli::CompressorWriter::with_params(&mut out, 4096, &params);
        writer
            .write_all(data)
            .map_err(|_| DriftlinkError::CompressFailure)?;
        writer.flush().map_err(|_| DriftlinkError::CompressFailure)?;
    }
    Ok(out)
}

pub fn decompress(data: &[u8]) -> Result<Vec<u8>, DriftlinkError> {
    let mut out = Vec::new();
    let mut reader = brotli::Decompressor::new(data, 4096);
    std::io::copy(&mut reader, &mut out).map_err(|_| DriftlinkError::DecompressFailure)?;
    Ok(out)
}
