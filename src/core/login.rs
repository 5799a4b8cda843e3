//! Challenge/response login digest for the management channel.
//!
//! The router answers a bare `/login` with `=ret=<hex challenge>`. The client
//! replies with `=response=00` followed by the hex MD5 of
//! `0x00 || password || challenge_bytes`.
use md5::{Digest, Md5};

use crate::{
    core::sentence::Sentence,
    ports::mgmt_transport::{TransportError, TransportResult},
};

pub const LOGIN_COMMAND: &str = "/login";

/// Compute the `=response=` value for a login challenge
pub fn challenge_response(password: &str, challenge_hex: &str) -> TransportResult<String> {
    let challenge = hex::decode(challenge_hex.trim()).map_err(|e| {
        TransportError::Protocol(format!("login challenge is not hex ({e}): {challenge_hex:?}"))
    })?;

    let mut hasher = Md5::new();
    hasher.update([0u8]);
    hasher.update(password.as_bytes());
    hasher.update(&challenge);
    Ok(format!("00{}", hex::encode(hasher.finalize())))
}

/// First step of the challenge exchange
pub fn challenge_request() -> Sentence {
    Sentence::command(LOGIN_COMMAND)
}

/// Second step of the challenge exchange
pub fn challenge_answer(user: &str, password: &str, challenge_hex: &str) -> TransportResult<Sentence> {
    Ok(Sentence::command(LOGIN_COMMAND)
        .attr("name", user)
        .attr("response", challenge_response(password, challenge_hex)?))
}

/// Single-step login used by routers that no longer issue challenges
pub fn plain_login(user: &str, password: &str) -> Sentence {
    Sentence::command(LOGIN_COMMAND)
        .attr("name", user)
        .attr("password", password)
}
