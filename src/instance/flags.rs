use bitflags::bitflags;

bitflags! {
    /// Lifecycle bits carried by every instance.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct InstanceFlags: u8 {
        /// Constructor is running; history tags sets as `initialized`
        const IN_CONSTRUCTOR = 1 << 0;
        /// Schema defaults have been written
        const DEFAULTS_SET = 1 << 1;
        /// Construction finished
        const INITIALIZED = 1 << 2;
        /// Sets are not recorded in history
        const DISABLE_HISTORY = 1 << 3;
        /// Rebuilding from reducer state; listeners are bypassed
        const UNPICKLING = 1 << 4;
    }
}
