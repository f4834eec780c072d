mod test_builder;
mod test_clustering;
mod test_controller;
mod test_data;
mod test_embedding;
mod test_keywords;

/// Install the test logger once; later calls are no-ops.
pub fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}
