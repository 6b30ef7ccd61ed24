use tokio::runtime::{Builder, Runtime};

/// Constructs a multi-threaded tokio [`Runtime`] with all drivers enabled.
///
/// Worker threads are named after `name`.
pub fn create_runtime(name: &str, threads: usize) -> std::io::Result<Runtime> {
    Builder::new_multi_thread()
        .thread_name(name)
        .worker_threads(threads)
        .enable_all()
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_runtime() {
        let runtime = create_runtime("test-rt", 1).unwrap();
        let value = runtime.block_on(async { 40 + 2 });
        assert_eq!(value, 42);
    }
}
