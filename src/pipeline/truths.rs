//! Fixed statements the service must never drift from, and the startup
//! check that they are still the ones that shipped.

use sha2::{Digest, Sha256};
use thiserror::Error;

use super::loop_detect::hex;

pub const PERSONA_NAME: &str = "TENMON-ARK";

/// `(id, statement)` pairs. Order is part of the digest.
pub const IMMUTABLE_TRUTHS: &[(&str, &str)] = &[
    ("T01", "資料に無いことを資料の言葉として語らない。"),
    ("T02", "引用は原文のまま扱い、書き換えない。"),
    ("T03", "根拠の無い主張は仮説として示す。"),
    ("T04", "結論を急がず、観測を残して次の問いへ渡す。"),
    ("T05", "利用者の合言葉と会話は、その利用者のセッションの外へ出さない。"),
    ("T06", "外部の生成器が答えられないときは、決まった短文で応じる。"),
];

/// System prompt for free chat. Built from the truths above so the model is
/// held to the same statements the plan passes enforce.
pub fn constitution_prompt() -> String {
    let mut prompt = format!(
        "あなたは {PERSONA_NAME} です。落ち着いた日本語で、短く要点から答えてください。\n\n【原則】\n"
    );
    for (_, text) in IMMUTABLE_TRUTHS {
        prompt.push_str("- ");
        prompt.push_str(text);
        prompt.push('\n');
    }
    prompt.push_str("\n文書名やページ番号を作って示してはいけません。");
    prompt
}

/// SHA-256 of the truths table as shipped.
pub const EXPECTED_TRUTHS_DIGEST: &str = "52b4ea67a7795a888e50cee2bd39849bfcdd9d4d21212ffd3b75108e801a572d";

#[derive(Error, Debug, PartialEq)]
pub enum IntegrityError {
    #[error("Immutable truths digest mismatch: expected {expected}, found {actual}")]
    DigestMismatch { expected: String, actual: String },
}

pub fn truths_digest() -> String {
    digest_of(IMMUTABLE_TRUTHS)
}

fn digest_of(truths: &[(&str, &str)]) -> String {
    let mut hasher = Sha256::new();
    for (id, text) in truths {
        hasher.update(id.as_bytes());
        hasher.update([0x1f_u8]);
        hasher.update(text.as_bytes());
        hasher.update(b"\n");
    }
    hex(&hasher.finalize())
}

pub fn verify_integrity() -> Result<(), IntegrityError> {
    check_digest(&truths_digest(), EXPECTED_TRUTHS_DIGEST)
}

fn check_digest(actual: &str, expected: &str) -> Result<(), IntegrityError> {
    if actual == expected {
        Ok(())
    } else {
        Err(IntegrityError::DigestMismatch {
            expected: expected.to_string(),
            actual: actual.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shipped_truths_pass_integrity_check() {
        assert_eq!(verify_integrity(), Ok(()));
    }

    #[test]
    fn tampered_table_is_detected() {
        let tampered = [("T01", "資料に無いことも語ってよい。")];
        let err = check_digest(&digest_of(&tampered), EXPECTED_TRUTHS_DIGEST).unwrap_err();
        assert!(matches!(err, IntegrityError::DigestMismatch { .. }));
    }

    #[test]
    fn digest_is_hex_sha256() {
        let d = truths_digest();
        assert_eq!(d.len(), 64);
        assert!(d.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn constitution_lists_every_truth() {
        let prompt = constitution_prompt();
        assert!(prompt.contains(PERSONA_NAME));
        for (_, text) in IMMUTABLE_TRUTHS {
            assert!(prompt.contains(text));
        }
    }
}
