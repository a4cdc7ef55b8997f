// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Byte-level tokenizer and response extraction.
//!
//! Token ids `0..=255` are raw bytes; [`EOS_TOKEN`] ends generation.

/// End-of-sequence token.
pub const EOS_TOKEN: u32 = 256;

/// Marker preceding the model's answer in chat-formatted output.
pub const RESPONSE_MARKER: &str = "Assistant:";

/// Encodes text as one token per byte.
pub fn encode(text: &str) -> Vec<u32> {
    text.bytes().map(u32::from).collect()
}

/// Decodes byte tokens, skipping special tokens. Invalid UTF-8 is
/// replaced rather than rejected.
pub fn decode(tokens: &[u32]) -> String {
    let bytes: Vec<u8> = tokens
        .iter()
        .filter_map(|&t| u8::try_from(t).ok())
        .collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

/// Extracts the answer from decoded output.
///
/// If `full_text` (prompt plus generation) contains [`RESPONSE_MARKER`],
/// the answer is everything after its first occurrence; otherwise it is
/// the generated part alone. Either way surrounding whitespace is trimmed.
pub fn extract_response(full_text: &str, generated: &str) -> String {
    match full_text.split_once(RESPONSE_MARKER) {
        Some((_, answer)) => answer.trim().to_string(),
        None => generated.trim().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_decode() {
        let tokens = encode("héllo");
        assert_eq!(tokens.len(), 6);
        assert_eq!(decode(&tokens), "héllo");
    }

    #[test]
    fn test_decode_skips_eos() {
        let mut tokens = encode("ab");
        tokens.push(EOS_TOKEN);
        assert_eq!(decode(&tokens), "ab");
    }

    #[test]
    fn test_extract_after_first_marker() {
        let full = "User: hi\nAssistant: hello there \nAssistant: again";
        assert_eq!(extract_response(full, "ignored"), "hello there \nAssistant: again");
    }

    #[test]
    fn test_extract_without_marker() {
        assert_eq!(extract_response("prompt  answer ", "  answer "), "answer");
    }
}
