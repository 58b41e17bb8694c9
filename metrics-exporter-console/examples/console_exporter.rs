use std::time::Duration;

use metrics::{counter, describe_histogram, gauge, histogram, Unit};
use metrics_exporter_console::ConsoleExporterBuilder;

fn main() {
    tracing_subscriber::fmt::init();

    let handle = ConsoleExporterBuilder::new()
        .with_export_interval(Duration::from_secs(2))
        .with_meter("console-demo", Some("0.1.0"))
        .with_histogram_bounds(&[0.005, 0.01, 0.025, 0.05, 0.1, 0.25])
        .install()
        .expect("failed to install console exporter");

    describe_histogram!("demo.loop.duration", Unit::Seconds, "Time spent in each loop iteration.");

    // Pretend to do some work, and report on it as we go.
    for iteration in 0u32..10 {
        let elapsed = f64::from(iteration % 4) * 0.02;

        counter!("demo.loop.iterations", "parity" => if iteration % 2 == 0 { "even" } else { "odd" }).increment(1);
        gauge!("demo.loop.last_iteration").set(f64::from(iteration));
        histogram!("demo.loop.duration").record(elapsed);

        std::thread::sleep(Duration::from_millis(500));
    }

    // Dropping the handle would do the same, but this surfaces any error from the final export.
    handle.shutdown().expect("failed to shut down console exporter");
}
