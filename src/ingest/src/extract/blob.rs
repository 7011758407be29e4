use std::io::Read;

use flate2::read::GzDecoder;

use crate::error::ExtractionError;

/// Gunzips a buffered single-document payload.
pub fn decompress_blob(compressed: &[u8]) -> Result<String, ExtractionError> {
    let mut decoder = GzDecoder::new(compressed);
    let mut body = Vec::new();
    decoder
        .read_to_end(&mut body)
        .map_err(ExtractionError::Blob)?;

    Ok(String::from_utf8_lossy(&body).into_owned())
}
