/// Application name
pub const APP_NAME: &str = "Palaver";

/// Maximum text message size in bytes (8 KiB)
pub const MAX_MESSAGE_SIZE: usize = 8_192;

/// Maximum attachment size in bytes (25 MiB)
pub const MAX_ATTACHMENT_SIZE: usize = 25 * 1024 * 1024;

/// Default page size for message list fetches
pub const DEFAULT_PAGE_SIZE: u32 = 50;

/// Depth of the relay notification channel
pub const RELAY_BUFFER: usize = 256;

/// Depth of the client event broadcast channel
pub const EVENT_BUFFER: usize = 128;

/// Bearer header name
pub const AUTH_HEADER: &str = "Authorization";
