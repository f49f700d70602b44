use thiserror::Error;

/// Failure of a single kernel query.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("sysctl {what} failed: {source}")]
    Sysctl {
        what: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{what} failed: {message} (kern_return_t {code})")]
    Mach {
        what: &'static str,
        code: i32,
        message: String,
    },

    #[error("{what} returned malformed data: {detail}")]
    Malformed { what: &'static str, detail: String },

    #[error("process sampling is not supported on this platform")]
    Unsupported,
}

impl KernelError {
    pub fn mach(what: &'static str, code: i32, message: impl Into<String>) -> Self {
        KernelError::Mach {
            what,
            code,
            message: message.into(),
        }
    }

    pub fn malformed(what: &'static str, detail: impl Into<String>) -> Self {
        KernelError::Malformed {
            what,
            detail: detail.into(),
        }
    }
}

/// Failure surfaced by the sampling components.
///
/// `Init` is fatal to the whole run, `ProcessTable` and `ArgumentBuffer` are
/// fatal to one snapshot only. The remaining variants describe one host metric
/// and never affect the others.
#[derive(Debug, Error)]
pub enum SampleError {
    #[error("system statistic error -- cannot get {what}: {source}")]
    Init {
        what: &'static str,
        #[source]
        source: KernelError,
    },

    #[error("system statistic error -- cannot read process table: {0}")]
    ProcessTable(#[source] KernelError),

    #[error("system statistic error -- cannot size argument buffer: {0}")]
    ArgumentBuffer(#[source] KernelError),

    #[error("system statistic error -- cannot get memory usage: {0}")]
    MemoryStatistics(#[source] KernelError),

    #[error("system statistic error -- cannot get swap usage: {0}")]
    SwapUsage(#[source] KernelError),

    #[error("system statistic error -- cannot get cpu load: {0}")]
    CpuLoad(#[source] KernelError),

    #[error("system statistic error -- cannot get load average: {0}")]
    LoadAverage(#[source] KernelError),
}

impl SampleError {
    pub fn is_fatal_to_snapshot(&self) -> bool {
        matches!(
            self,
            SampleError::ProcessTable(_) | SampleError::ArgumentBuffer(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diagnostics_name_the_failing_query() {
        let err = SampleError::Init {
            what: "clock rate",
            source: KernelError::mach("host_statistics", 5, "(os/kern) failure"),
        };
        let text = err.to_string();
        assert!(text.contains("clock rate"), "{text}");
        assert!(text.contains("host_statistics"), "{text}");
    }

    #[test]
    fn only_table_and_argument_failures_drop_the_snapshot() {
        assert!(SampleError::ProcessTable(KernelError::Unsupported).is_fatal_to_snapshot());
        assert!(SampleError::ArgumentBuffer(KernelError::Unsupported).is_fatal_to_snapshot());
        assert!(!SampleError::SwapUsage(KernelError::Unsupported).is_fatal_to_snapshot());
        assert!(!SampleError::CpuLoad(KernelError::Unsupported).is_fatal_to_snapshot());
    }
}
