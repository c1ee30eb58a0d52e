/// Environment toggle deciding whether instrumentation starts active.
pub const ENV_ENABLE: &str = "DUECREDIT_ENABLE";

/// Environment override for the persisted-state file.
pub const ENV_FILE: &str = "DUECREDIT_FILE";

/// Environment override for the summary outputs rendered at exit.
pub const ENV_OUTPUTS: &str = "DUECREDIT_OUTPUTS";

/// State file used when `DUECREDIT_FILE` is unset, relative to the working directory.
pub const DEFAULT_STATE_FILE: &str = ".duecredit.json";

/// Summary outputs used when `DUECREDIT_OUTPUTS` is unset.
pub const DEFAULT_OUTPUTS: &str = "text";

/// Operation names owned by the switch itself; never rebound from a collector.
pub const RESERVED_NAMES: [&str; 3] = ["activate", "active", "dump"];

/// Operation names starting with this marker are internal and never bound.
pub const INTERNAL_PREFIX: char = '_';

/// Tag applied to citations that do not specify any.
pub const DEFAULT_TAG: &str = "implementation";
