//! Keenetic challenge-response digest

use md5::Md5;
use sha2::{Digest, Sha256};

/// Response header carrying the router realm on `GET /auth`
pub const REALM_HEADER: &str = "X-NDM-Realm";
/// Response header carrying the one-time challenge on `GET /auth`
pub const CHALLENGE_HEADER: &str = "X-NDM-Challenge";

/// `SHA256(challenge ++ MD5(login:realm:password))`, both stages hex encoded
pub fn compute_auth_hash(challenge: &str, login: &str, realm: &str, password: &str) -> String {
    let credentials = hex::encode(Md5::digest(format!("{login}:{realm}:{password}")));
    hex::encode(Sha256::digest(format!("{challenge}{credentials}")))
}
