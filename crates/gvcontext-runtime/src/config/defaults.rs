//! Compile-time defaults merged by build.rs (see `GVC_CONFIG_RS`)

include!(concat!(env!("OUT_DIR"), "/gvc_merged_config.rs"));
