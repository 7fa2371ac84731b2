use std::error::Error;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use log::{info, warn};
use serde_derive::{Deserialize, Serialize};
use signal_hook::consts::{SIGINT, SIGTERM};

use fanout::{Queue, QueueConfig};

const END_OF_STREAM: u64 = u64::MAX;

#[derive(clap::Parser)]
#[clap()]
struct Opts {
    #[clap(short = 'c', long = "config", default_value = "fanout-bench.toml")]
    config: String,
    #[clap(short = 'n', long = "messages")]
    messages: Option<usize>,
    #[clap(long = "log-level", default_value = "info")]
    log_level: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(default)]
struct BenchConfig {
    messages: usize,
    queue: QueueConfig,
}

impl Default for BenchConfig {
    fn default() -> BenchConfig {
        BenchConfig {
            messages: 10_000_000,
            queue: QueueConfig::with_consumers(2),
        }
    }
}

fn load_config<P: AsRef<Path>>(path: P) -> Result<BenchConfig, confy::ConfyError> {
    confy::load_path(path)
}

fn main() -> Result<(), Box<dyn Error>> {
    let opts: Opts = Opts::parse();
    let _logger = flexi_logger::Logger::try_with_str(&opts.log_level)?.start()?;

    let mut cfg = load_config(&opts.config)?;
    if let Some(messages) = opts.messages {
        cfg.messages = messages;
    }
    info!("{:?}", cfg);

    let closing = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGINT, Arc::clone(&closing))?;
    signal_hook::flag::register(SIGTERM, Arc::clone(&closing))?;

    let queue = Queue::with_config(&cfg.queue)?;
    run(&queue, cfg.messages, &closing);
    Ok(())
}

struct ConsumerReport {
    index: usize,
    received: u64,
    elapsed: Duration,
}

fn run(queue: &Queue<u64>, messages: usize, closing: &AtomicBool) {
    let start = Instant::now();
    let (written, reports) = thread::scope(|s| {
        let producer = s.spawn(|| produce(queue, messages, closing));
        let consumers: Vec<_> = (0..queue.consumer_count())
            .map(|index| s.spawn(move || consume(queue, index)))
            .collect();
        let reports: Vec<ConsumerReport> = consumers
            .into_iter()
            .filter_map(|handle| handle.join().ok())
            .collect();
        (producer.join().unwrap_or(0), reports)
    });

    let duration = start.elapsed();
    println!(
        "\n{}K messages write/s. Total time: {:#?}",
        throughput(written, duration) / 1000,
        duration
    );
    for report in reports {
        println!(
            "consumer {}: received {}, dropped {}, {}K messages read/s",
            report.index,
            report.received,
            written.saturating_sub(report.received),
            throughput(report.received, report.elapsed) / 1000
        );
    }
    println!("retained at exit: {}", queue.retained());
}

fn produce(queue: &Queue<u64>, messages: usize, closing: &AtomicBool) -> u64 {
    let producer = queue.producer();
    let mut written = 0u64;
    while (written as usize) < messages {
        if closing.load(Ordering::Relaxed) {
            warn!("interrupted after {} messages", written);
            break;
        }
        producer.append(written);
        written += 1;
        if written % 1_000_000 == 0 {
            eprint!("\rTotal {} ops", written);
        }
    }
    producer.append(END_OF_STREAM);
    written
}

fn consume(queue: &Queue<u64>, index: usize) -> ConsumerReport {
    let start = Instant::now();
    let mut received = 0u64;
    // the index comes from consumer_count, so the lookup cannot fail
    if let Ok(consumer) = queue.consumer(index) {
        while consumer.pop() != END_OF_STREAM {
            received += 1;
        }
    }
    ConsumerReport {
        index,
        received,
        elapsed: start.elapsed(),
    }
}

#[inline]
fn throughput(count: u64, duration: Duration) -> u64 {
    let millis = duration.as_millis().max(1) as f64;
    ((count as f64) / millis * 1_000f64) as u64
}
