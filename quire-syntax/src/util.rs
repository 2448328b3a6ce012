use log::{error, warn};

pub trait OptionLog {
    /// Log an error if the value is `None`.
    fn error_none(self, f: &str) -> Self;
    /// Log a warning if the value is `None`.
    fn warn_none(self, f: &str) -> Self;
}

impl<T> OptionLog for Option<T> {
    #[inline]
    fn error_none(self, f: &str) -> Self {
        self.or_else(|| {
            error!("{f}");

            None
        })
    }

    #[inline]
    fn warn_none(self, f: &str) -> Self {
        self.or_else(|| {
            warn!("{f}");

            None
        })
    }
}
