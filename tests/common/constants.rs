//! Shared fixture values for the publish-pipeline integration tests.

pub const TEST_USER_ADDRESS: &str = "0x00000000000000000000000000000000000000ab";

pub const PARENT_IP_ID: &str = "0x00000000000000000000000000000000000000aa";
pub const LICENSE_TERMS_ID: &str = "7";
pub const LICENSE_TEMPLATE: &str = "0x00000000000000000000000000000000000000bb";

pub const IP_METADATA_HASH: &str = "0x111111111111111111111111111111111111111111111111111111111111111a";
pub const NFT_METADATA_HASH: &str = "0x222222222222222222222222222222222222222222222222222222222222222b";

pub const SAMPLE_AUDIO_BYTES: &[u8] = b"not-really-audio-but-good-enough-for-a-fixture";
