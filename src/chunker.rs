//! Troceado del texto extraído en ventanas fijas de caracteres.
//!
//! `chunk[i] = text[1000·i .. 1000·i + 1000]`, sin solapamiento y sin respetar
//! palabras ni frases. Se cuenta en caracteres, nunca se corta una secuencia
//! UTF-8 por la mitad.

use sha2::{Digest, Sha256};

use crate::config::CHUNK_SIZE;
use crate::models::Chunk;

/// Trocea el texto en chunks de [`CHUNK_SIZE`] caracteres con ids ordinales.
pub fn chunk_text(text: &str) -> Vec<Chunk> {
    split_fixed(text, CHUNK_SIZE)
        .into_iter()
        .enumerate()
        .map(|(position, piece)| Chunk {
            id: position.to_string(),
            position,
            text: piece.to_string(),
        })
        .collect()
}

/// Longitud (en caracteres hex) de la clave de documento.
const DOCUMENT_KEY_LEN: usize = 16;

/// Clave estable de un documento: prefijo del SHA-256 de su texto.
pub fn document_key(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let mut hash = format!("{:x}", hasher.finalize());
    hash.truncate(DOCUMENT_KEY_LEN);
    hash
}

fn split_fixed(text: &str, size: usize) -> Vec<&str> {
    let mut pieces = Vec::with_capacity(text.len() / size + 1);
    let mut start = 0;
    let mut count = 0;

    for (idx, _) in text.char_indices() {
        if count == size {
            pieces.push(&text[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    if start < text.len() {
        pieces.push(&text[start..]);
    }
    pieces
}
