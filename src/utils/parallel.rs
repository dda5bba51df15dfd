//! Parallel processing utilities

/// Resolve a requested thread count, 0 meaning every available core
pub fn resolve_threads(threads: usize) -> usize {
    if threads == 0 {
        num_cpus::get()
    } else {
        threads
    }
}

/// Build a dedicated worker pool; runs never use the global one.
pub fn build_worker_pool(threads: usize) -> Result<rayon::ThreadPool, rayon::ThreadPoolBuildError> {
    rayon::ThreadPoolBuilder::new()
        .num_threads(resolve_threads(threads))
        .thread_name(|i| format!("masht-worker-{}", i))
        .build()
}
