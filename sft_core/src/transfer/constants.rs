/// Default TCP port for file transfer
pub const TRANSFER_PORT: u16 = 8888;

/// Greeting token sent by the client to open a session
pub const GREETING: &[u8] = b"Hello!";

/// Accept token sent by the server on a matching greeting
pub const ACCEPT: &[u8] = b"Ready!";

/// Rejection token sent on a garbled greeting, before closing
pub const REJECT: &[u8] = b"Invalid handshake";

/// Width of the zero-padded decimal ASCII length prefix
pub const LEN_PREFIX_SIZE: usize = 8;

/// Maximum frame payload accepted on either side (64 MiB).
/// The 8-digit prefix caps frames at 99_999_999 bytes anyway; this limit
/// rejects oversized allocations well before that.
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Buffer size for the one-shot handshake reads
pub const HANDSHAKE_READ_SIZE: usize = 64;

/// Buffer size for the unframed public-key bootstrap read
pub const PUBKEY_READ_SIZE: usize = 2048;
