use tracing_subscriber::EnvFilter;

#[doc(hidden)]
pub fn __init_test(module_path: &'static str) {
    let crate_name = module_path.split("::").next().unwrap_or(module_path);

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(format!("{crate_name}=trace")))
        .with_test_writer()
        .compact()
        .try_init()
        .ok();
}

/// Installs a compact subscriber for tests.
///
/// Output goes through the test harness, so it is only shown for failing tests. Only events of
/// the calling crate are captured, at all levels. Calling this more than once is a no-op.
///
/// ```
/// aggregated_log::init_test!();
/// aggregated_log::debug!("visible in failing tests");
/// ```
#[macro_export]
macro_rules! init_test {
    () => {
        $crate::__init_test(::std::module_path!());
    };
}
