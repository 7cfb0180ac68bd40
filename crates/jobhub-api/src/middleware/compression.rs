//! Response compression layer.

use tower_http::compression::CompressionLayer;

/// Builds a gzip compression layer. The default predicate skips
/// `text/event-stream`, so progress streams are flushed uncompressed.
pub fn build_compression_layer() -> CompressionLayer {
    CompressionLayer::new()
}
