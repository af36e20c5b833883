//! HFP protocol constants
//!
//! Feature bitmask semantics follow the HFP specification; the bit layout
//! is the one exchanged in `AT+BRSF` / `+BRSF:` frames.

// HF supported features (AT+BRSF=<n>)
pub const HFP_HF_FEAT_ECNR: u32 = 1 << 0;
pub const HFP_HF_FEAT_3WC: u32 = 1 << 1;
pub const HFP_HF_FEAT_CLI: u32 = 1 << 2;
pub const HFP_HF_FEAT_VOICE: u32 = 1 << 3;
pub const HFP_HF_FEAT_VOLUME: u32 = 1 << 4;
pub const HFP_HF_FEAT_ECS: u32 = 1 << 5;
pub const HFP_HF_FEAT_ECC: u32 = 1 << 6;
pub const HFP_HF_FEAT_CODEC: u32 = 1 << 9;

// AG supported features (+BRSF: <n>)
pub const HFP_AG_FEAT_3WC: u32 = 1 << 0;
pub const HFP_AG_FEAT_ECNR: u32 = 1 << 1;
pub const HFP_AG_FEAT_VOICE: u32 = 1 << 2;
pub const HFP_AG_FEAT_RING: u32 = 1 << 3;
pub const HFP_AG_FEAT_VTAG: u32 = 1 << 4;
pub const HFP_AG_FEAT_REJECT: u32 = 1 << 5;
pub const HFP_AG_FEAT_ECS: u32 = 1 << 6;
pub const HFP_AG_FEAT_ECC: u32 = 1 << 7;
pub const HFP_AG_FEAT_EERC: u32 = 1 << 8;
pub const HFP_AG_FEAT_CODEC: u32 = 1 << 9;

// Voice codec identifiers (AT+BAC / +BCS)
pub const HFP_CODEC_UNDEFINED: u8 = 0;
pub const HFP_CODEC_CVSD: u8 = 1;
pub const HFP_CODEC_MSBC: u8 = 2;

/// Indicator vocabulary advertised in the `+CIND=?` test response
pub const HFP_IND_VOCABULARY: &str = "(\"call\",(0,1))\
    ,(\"callsetup\",(0-3))\
    ,(\"service\",(0-1))\
    ,(\"signal\",(0-5))\
    ,(\"roam\",(0-1))\
    ,(\"battchg\",(0-5))\
    ,(\"callheld\",(0-2))";

/// Upper bound on AG-advertised indicator positions we track
pub const HFP_IND_MAP_SIZE: usize = 20;

// Service level connection establishment tunables
pub const SLC_RETRIES: u32 = 10;
pub const SLC_TIMEOUT_MS: i32 = 10000;
