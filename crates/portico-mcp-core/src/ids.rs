//! Identifier generation: session ids, SSE event ids, request ids, and
//! secure random strings.

use uuid::Uuid;

/// Opaque session id for HTTP transport sessions.
pub fn generate_session_id() -> String {
    Uuid::new_v4().to_string()
}

/// Event id component for SSE streams.
pub fn generate_event_id() -> String {
    Uuid::new_v4().to_string()
}

/// Allocates monotonically increasing numeric request ids for one
/// session.
#[derive(Debug)]
pub struct RequestIdAllocator {
    next: std::sync::atomic::AtomicI64,
}

impl RequestIdAllocator {
    pub fn new() -> Self {
        Self {
            next: std::sync::atomic::AtomicI64::new(1),
        }
    }

    pub fn next(&self) -> crate::protocol::RequestId {
        let n = self.next.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        crate::protocol::RequestId::Number(n)
    }
}

impl Default for RequestIdAllocator {
    fn default() -> Self {
        Self::new()
    }
}

/// Random alphanumeric string of the given length.
pub fn generate_secure_random(length: usize) -> String {
    use rand::Rng;
    const CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
    let mut rng = rand::rng();
    (0..length)
        .map(|_| {
            let index = rng.random_range(0..CHARSET.len());
            CHARSET[index] as char
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::RequestId;

    #[test]
    fn session_ids_unique() {
        assert_ne!(generate_session_id(), generate_session_id());
    }

    #[test]
    fn request_ids_monotonic() {
        let allocator = RequestIdAllocator::new();
        let a = allocator.next();
        let b = allocator.next();
        match (a, b) {
            (RequestId::Number(a), RequestId::Number(b)) => assert!(b > a),
            _ => panic!("expected numeric ids"),
        }
    }

    #[test]
    fn secure_random_shape() {
        let s = generate_secure_random(64);
        assert_eq!(s.len(), 64);
        assert!(s.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(s, generate_secure_random(64));
    }
}
