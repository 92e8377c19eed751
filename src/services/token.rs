//! # 세션 토큰 암호화/복호화 (TokenCodec)
//!
//! 세션 정보를 AES-256-GCM으로 암호화해 불투명한(opaque) 문자열 토큰을 만듭니다.
//!
//! ## 토큰 형식
//! ```text
//! base64( nonce(12바이트) ‖ ciphertext ‖ tag(16바이트) )
//! ```
//! - 키: 설정의 `ENCRYPTION_KEY`를 SHA-256으로 해시한 32바이트
//! - nonce: 토큰마다 OsRng로 새로 생성
//! - 평문: `{"sub","usr","iat","exp"}` JSON
//!
//! 복호화만으로도 만료된 토큰을 걸러낼 수 있지만, 폐기(로그아웃/재로그인) 여부는
//! 여전히 세션 저장소가 최종 판단합니다.

use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Key, Nonce,
};
use base64::{engine::general_purpose::STANDARD, Engine};
use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use thiserror::Error;

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// 토큰 안에 들어가는 세션 정보
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPayload {
    /// principal ID
    pub sub: String,
    /// username
    pub usr: String,
    /// 세션 발급 시각 (epoch ms)
    pub iat: i64,
    /// 발급 당시의 만료 시각 (epoch ms)
    pub exp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// base64가 아니거나, 길이가 모자라거나, 평문이 payload 형식이 아님
    #[error("token is malformed")]
    Malformed,
    /// 인증 태그 검증 실패 (변조되었거나 다른 키로 만든 토큰)
    #[error("token failed authentication")]
    TamperedOrWrongKey,
}

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("failed to serialize session payload: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("encryption failed")]
    Encrypt,
}

#[derive(Clone)]
pub struct TokenCodec {
    key: [u8; 32],
}

impl fmt::Debug for TokenCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenCodec").field("key", &"<redacted>").finish()
    }
}

impl TokenCodec {
    /// 설정 문자열에서 키를 유도합니다. (SHA-256)
    pub fn from_secret(secret: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(secret.as_bytes());
        Self {
            key: hasher.finalize().into(),
        }
    }

    pub fn encode(&self, payload: &SessionPayload) -> Result<String, EncodeError> {
        let plaintext = serde_json::to_vec(payload)?;

        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher()
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_slice())
            .map_err(|_| EncodeError::Encrypt)?;

        let mut wire = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        wire.extend_from_slice(&nonce_bytes);
        wire.extend_from_slice(&ciphertext);
        Ok(STANDARD.encode(wire))
    }

    pub fn decode(&self, token: &str) -> Result<SessionPayload, DecodeError> {
        let wire = STANDARD.decode(token).map_err(|_| DecodeError::Malformed)?;
        if wire.len() < NONCE_LEN + TAG_LEN {
            return Err(DecodeError::Malformed);
        }

        let (nonce, ciphertext) = wire.split_at(NONCE_LEN);
        let plaintext = self
            .cipher()
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| DecodeError::TamperedOrWrongKey)?;

        serde_json::from_slice(&plaintext).map_err(|_| DecodeError::Malformed)
    }

    fn cipher(&self) -> Aes256Gcm {
        Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&self.key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> SessionPayload {
        SessionPayload {
            sub: "0190a1b2-0000-7000-8000-000000000001".into(),
            usr: "registrar".into(),
            iat: 1_767_225_600_000,
            exp: 1_767_237_600_000,
        }
    }

    #[test]
    fn round_trips() {
        let codec = TokenCodec::from_secret("ingtech");
        let token = codec.encode(&payload()).unwrap();
        assert_eq!(codec.decode(&token).unwrap(), payload());
    }

    #[test]
    fn nonces_differ_per_token() {
        let codec = TokenCodec::from_secret("ingtech");
        assert_ne!(codec.encode(&payload()).unwrap(), codec.encode(&payload()).unwrap());
    }

    #[test]
    fn every_single_bit_flip_is_rejected() {
        let codec = TokenCodec::from_secret("ingtech");
        let token = codec.encode(&payload()).unwrap();
        let wire = STANDARD.decode(&token).unwrap();

        for byte in 0..wire.len() {
            for bit in 0..8 {
                let mut mutated = wire.clone();
                mutated[byte] ^= 1 << bit;
                assert!(
                    codec.decode(&STANDARD.encode(&mutated)).is_err(),
                    "flip at byte {byte} bit {bit} was accepted"
                );
            }
        }
    }

    #[test]
    fn flipped_token_text_is_rejected() {
        let codec = TokenCodec::from_secret("ingtech");
        let token = codec.encode(&payload()).unwrap();

        for i in 0..token.len() {
            for bit in 0..7 {
                let mut bytes = token.clone().into_bytes();
                bytes[i] ^= 1 << bit;
                let Ok(mutated) = String::from_utf8(bytes) else { continue };
                assert!(codec.decode(&mutated).is_err(), "flip at char {i} bit {bit}");
            }
        }
    }

    #[test]
    fn wrong_key_fails_authentication() {
        let token = TokenCodec::from_secret("ingtech").encode(&payload()).unwrap();
        assert_eq!(
            TokenCodec::from_secret("other").decode(&token),
            Err(DecodeError::TamperedOrWrongKey)
        );
    }

    #[test]
    fn garbage_is_malformed() {
        let codec = TokenCodec::from_secret("ingtech");
        assert_eq!(codec.decode("not base64!"), Err(DecodeError::Malformed));
        assert_eq!(codec.decode(&STANDARD.encode([0u8; 20])), Err(DecodeError::Malformed));
    }

    #[test]
    fn debug_hides_key() {
        let rendered = format!("{:?}", TokenCodec::from_secret("ingtech"));
        assert!(rendered.contains("redacted"));
    }
}
