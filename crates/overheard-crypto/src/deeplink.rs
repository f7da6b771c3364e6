use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Length of an issued code. 20 base64url characters carry 120 bits of the
/// HMAC output, so a collision between any two of a billion channels has a
/// probability below 2^-60.
pub const CODE_LEN: usize = 20;

/// Derives short, URL-safe deeplink codes from a chat id.
///
/// The code is `base64url(HMAC-SHA256(salt, chat_id))[..CODE_LEN]`: the same
/// chat id always yields the same code, and without the salt a code reveals
/// nothing about the chat it points to.
#[derive(Clone)]
pub struct DeeplinkCodec {
    salt: Vec<u8>,
}

impl DeeplinkCodec {
    pub fn new(salt: &str) -> Self {
        Self {
            salt: salt.as_bytes().to_vec(),
        }
    }

    pub fn derive_code(&self, chat_id: i64) -> String {
        let mut mac =
            HmacSha256::new_from_slice(&self.salt).expect("HMAC can take key of any size");
        mac.update(chat_id.to_string().as_bytes());
        let digest = mac.finalize().into_bytes();

        let mut code = URL_SAFE_NO_PAD.encode(digest);
        code.truncate(CODE_LEN);
        code
    }

    /// Shape check before touching storage: right length, base64url alphabet.
    pub fn is_well_formed(code: &str) -> bool {
        code.len() == CODE_LEN
            && code
                .bytes()
                .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
    }
}

impl std::fmt::Debug for DeeplinkCodec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeeplinkCodec").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivation_is_deterministic() {
        let codec = DeeplinkCodec::new("pepper");
        assert_eq!(codec.derive_code(-1001234567890), codec.derive_code(-1001234567890));
    }

    #[test]
    fn codes_are_fixed_length_and_url_safe() {
        let codec = DeeplinkCodec::new("pepper");
        for chat_id in [-1001234567890, -1009999999999, 0, i64::MIN] {
            let code = codec.derive_code(chat_id);
            assert_eq!(code.len(), CODE_LEN);
            assert!(DeeplinkCodec::is_well_formed(&code), "{}", code);
        }
    }

    #[test]
    fn salt_and_chat_both_change_the_code() {
        let a = DeeplinkCodec::new("pepper");
        let b = DeeplinkCodec::new("paprika");
        assert_ne!(a.derive_code(-1001), b.derive_code(-1001));
        assert_ne!(a.derive_code(-1001), a.derive_code(-1002));
    }

    #[test]
    fn code_does_not_contain_the_chat_id() {
        let codec = DeeplinkCodec::new("pepper");
        let code = codec.derive_code(-1001234567890);
        assert!(!code.contains("1234567890"));
    }

    #[test]
    fn malformed_codes_are_rejected() {
        assert!(!DeeplinkCodec::is_well_formed(""));
        assert!(!DeeplinkCodec::is_well_formed("short"));
        assert!(!DeeplinkCodec::is_well_formed("abcdefghij/lmnopqrst"));
    }

    #[test]
    fn debug_hides_the_salt() {
        let codec = DeeplinkCodec::new("super-secret");
        assert!(!format!("{:?}", codec).contains("super-secret"));
    }
}
