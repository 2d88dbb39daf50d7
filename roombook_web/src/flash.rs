use axum::http::{header, HeaderMap, HeaderValue};
use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};

const COOKIE_NAME: &str = "flash";

/// 次の画面で一度だけ表示するメッセージ
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub level: FlashLevel,
    pub message: String,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashLevel {
    Success,
    Info,
    Danger,
}

impl FlashLevel {
    pub fn css_class(&self) -> &'static str {
        match self {
            FlashLevel::Success => "success",
            FlashLevel::Info => "info",
            FlashLevel::Danger => "danger",
        }
    }
}

impl Flash {
    pub fn new(level: FlashLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    /// `Set-Cookie`ヘッダーの値
    pub fn to_cookie(&self) -> String {
        let json = serde_json::to_vec(self).unwrap_or_default();
        format!(
            "{}={}; Path=/; HttpOnly; SameSite=Lax",
            COOKIE_NAME,
            general_purpose::URL_SAFE_NO_PAD.encode(json)
        )
    }

    /// リクエストのCookieから取り出す
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        headers
            .get_all(header::COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .flat_map(|v| v.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == COOKIE_NAME)
            .and_then(|(_, value)| general_purpose::URL_SAFE_NO_PAD.decode(value).ok())
            .and_then(|bytes| serde_json::from_slice(&bytes).ok())
    }
}

/// 表示済みのメッセージを消す`Set-Cookie`ヘッダーの値
pub fn clear_cookie() -> HeaderValue {
    HeaderValue::from_static("flash=; Path=/; Max-Age=0")
}
