//! Example of using scalarlog-core directly from Rust.

use scalarlog_core::{LoggerConfig, MetricsLogger, RunMode};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Setup configuration; fresh-start backs up logs left by a previous run
    let config = LoggerConfig::new("sine_demo", "./logs").with_mode(RunMode::FreshStart);

    // 2. Initialize the logger
    let mut logger = MetricsLogger::new(config)?;
    println!("Logging to {}", logger.config().job_dir().display());

    // 3. Simulate a training loop
    for step in 0..50u64 {
        let x = step as f64 * 0.1;
        let mut metrics = vec![("loss", x.cos().abs()), ("lr", 0.01)];

        // Validation every 10 steps goes to val/log.csv
        if step % 10 == 0 {
            metrics.push(("val/loss", x.sin().abs()));
        }
        // A metric that only appears later expands train/log.csv in place
        if step >= 25 {
            metrics.push(("grad_norm", 1.0 / (x + 1.0)));
        }

        logger.log(metrics, step)?;
    }

    // 4. Release all file handles
    logger.close()?;
    println!("Categories: {:?}", logger.categories().collect::<Vec<_>>());

    Ok(())
}
