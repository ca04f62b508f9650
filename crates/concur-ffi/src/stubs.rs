//! Seams for excluded collaborators (spec.md §6.3). These traits exist
//! so a higher layer can plug in a codec, a projection, or transport
//! without this crate depending on one; there is no production
//! implementation here, and adding one is out of scope.

/// A pickle-style wire codec for `(i64, i64)` pairs. No implementation
/// ships in this crate; an embedder supplies one.
pub trait WireCodec {
    fn encode_i64_pair(&self, pair: (i64, i64)) -> Vec<u8>;
    fn decode_i64_pair(&self, bytes: &[u8]) -> Option<(i64, i64)>;
}

/// A seam for projecting map entries onto an external cube/analytics
/// representation. No implementation ships in this crate.
pub trait CubeProjection {
    fn project(&self, pairs: &[(i64, i64)]);
}

/// A seam for a remote transport carrying lock/map operations across a
/// socket. No implementation ships in this crate.
pub trait RemoteEndpoint {
    fn send(&self, bytes: &[u8]) -> std::io::Result<()>;
    fn recv(&self) -> std::io::Result<Vec<u8>>;
}
