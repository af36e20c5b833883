//! Engine configuration
//!
//! Feature bitmasks advertised during the `+BRSF` exchange and the service
//! level connection retry tunables.

use crate::hfp::constants::*;

/// Configuration for an RFCOMM session
#[derive(Debug, Clone, Copy)]
pub struct Config {
    /// Features advertised when acting as the Audio Gateway
    pub features_rfcomm_ag: u32,
    /// Features advertised when acting as the Hands-Free unit
    pub features_rfcomm_hf: u32,
    /// How many times an unanswered SLC command is re-sent before giving up
    pub slc_retries: u32,
    /// Poll timeout in milliseconds while waiting for an SLC reply
    pub slc_timeout_ms: i32,
}

impl Default for Config {
    fn default() -> Self {
        let codec = if cfg!(feature = "msbc") {
            (HFP_AG_FEAT_CODEC, HFP_HF_FEAT_CODEC)
        } else {
            (0, 0)
        };
        Self {
            features_rfcomm_ag: HFP_AG_FEAT_REJECT | HFP_AG_FEAT_ECS | codec.0,
            features_rfcomm_hf: HFP_HF_FEAT_CLI
                | HFP_HF_FEAT_VOLUME
                | HFP_HF_FEAT_ECS
                | HFP_HF_FEAT_ECC
                | codec.1,
            slc_retries: SLC_RETRIES,
            slc_timeout_ms: SLC_TIMEOUT_MS,
        }
    }
}
