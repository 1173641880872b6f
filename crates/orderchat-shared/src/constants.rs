/// Maximum message body length in characters.
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 1000;

/// History / listing page size when the caller gives none.
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Upper bound for any page size.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Per-connection outbound event queue depth.
pub const DEFAULT_OUTBOUND_BUFFER: usize = 256;

/// Default HTTP API port
pub const DEFAULT_HTTP_PORT: u16 = 8080;

/// Clamp a caller-supplied page size into `[1, MAX_PAGE_SIZE]`.
pub fn clamp_page_size(limit: Option<u32>) -> u32 {
    limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_page_size() {
        assert_eq!(clamp_page_size(None), DEFAULT_PAGE_SIZE);
        assert_eq!(clamp_page_size(Some(0)), 1);
        assert_eq!(clamp_page_size(Some(10)), 10);
        assert_eq!(clamp_page_size(Some(5000)), MAX_PAGE_SIZE);
    }
}
