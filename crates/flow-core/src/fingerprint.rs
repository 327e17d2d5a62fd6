//! Server-playback fingerprint: a stable digest over a request projection.
//!
//! Mirrors the canonicalize-then-hash split the chem engine uses for its
//! artifact fingerprints, with the hash swapped for SHA-256 (playback
//! fingerprints must match byte-for-byte across process restarts, and SHA-256
//! is the digest the flow log format commits to).

use flow_domain::Request;
use sha2::{Digest, Sha256};

pub type Fingerprint = [u8; 32];

/// Digests `{host, port, scheme, method, path, content}` and, if `headers`
/// is non-empty, the ordered `(name, values)` pairs for each listed header
/// in the allowlist's declared order.
pub fn fingerprint(request: &Request, header_allowlist: &[String]) -> Fingerprint {
    let mut hasher = Sha256::new();

    update_field(&mut hasher, request.host.as_bytes());
    update_field(&mut hasher, &request.port.to_be_bytes());
    update_field(&mut hasher, request.scheme.as_bytes());
    update_field(&mut hasher, request.method.as_bytes());
    update_field(&mut hasher, request.path.as_bytes());
    update_field(&mut hasher, &request.content);

    for name in header_allowlist {
        update_field(&mut hasher, name.as_bytes());
        for value in request.headers.get_all(name) {
            update_field(&mut hasher, value.as_bytes());
        }
    }

    hasher.finalize().into()
}

/// Length-prefixes each field so `("ab", "c")` and `("a", "bc")` never
/// collide after concatenation.
fn update_field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_be_bytes());
    hasher.update(bytes);
}
