//! ICE server configuration with time-limited TURN credentials
//! (HMAC-SHA1 REST scheme).

use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::config::TurnConfig;
use crate::protocol::{IceServer, ServerMessage};
use crate::state::AppState;

type HmacSha1 = Hmac<Sha1>;

/// Hand the requesting client its ICE server list. Credentials are minted
/// per request so each negotiation gets a fresh expiry.
pub async fn handle_ice_config(state: &Arc<AppState>, connection_id: &str) {
    let turn = &state.config.turn;

    if turn.url.is_empty() || turn.secret.is_empty() {
        let _ = state.registry.send_to(
            connection_id,
            ServerMessage::IceConfig {
                success: false,
                servers: Vec::new(),
                ttl: 0,
                error: Some("TURN server not configured".to_string()),
            },
        );
        return;
    }

    let servers = mint_ice_servers(turn);
    let _ = state.registry.send_to(
        connection_id,
        ServerMessage::IceConfig {
            success: true,
            servers,
            ttl: turn.credential_ttl,
            error: None,
        },
    );

    tracing::debug!(connection_id = %connection_id, "ICE config sent");
}

/// Build the ICE server list with a time-limited username/credential pair:
/// `username = "<expiry>:<nonce>"`, `credential = base64(hmac_sha1(secret,
/// username))`.
pub fn mint_ice_servers(config: &TurnConfig) -> Vec<IceServer> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    let expiry = now + config.credential_ttl;
    let nonce: u64 = rand::random();
    let username = format!("{expiry}:{nonce:x}");
    let credential = hmac_sha1_base64(&config.secret, &username);

    let mut turn_urls = Vec::new();
    if config.enable_udp {
        turn_urls.push(format!("turn:{}:{}", config.url, config.ports.udp));
    }
    if config.enable_tcp {
        turn_urls.push(format!(
            "turn:{}:{}?transport=tcp",
            config.url, config.ports.tcp
        ));
    }
    if config.enable_tls {
        turn_urls.push(format!(
            "turns:{}:{}?transport=tcp",
            config.url, config.ports.tls
        ));
    }

    let mut servers = vec![IceServer {
        urls: turn_urls,
        username: Some(username),
        credential: Some(credential),
        credential_type: Some("password".to_string()),
    }];

    // STUN needs no credentials.
    if config.enable_udp {
        servers.push(IceServer {
            urls: vec![format!("stun:{}:{}", config.url, config.ports.udp)],
            username: None,
            credential: None,
            credential_type: None,
        });
    }

    servers
}

fn hmac_sha1_base64(secret: &str, message: &str) -> String {
    let mut mac =
        HmacSha1::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(message.as_bytes());
    BASE64.encode(mac.finalize().into_bytes())
}
