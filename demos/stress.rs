use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rand::Rng;
use tickwheel::{TimerResult, TimerWheel};

const PRODUCERS: usize = 4;
const PER_PRODUCER: usize = 250;

fn main() -> TimerResult<()> {
    let wheel = Arc::new(TimerWheel::new(256, Duration::from_millis(10))?);
    let (tx, rx) = crossbeam_channel::unbounded();

    let start = Instant::now();
    let producers: Vec<_> = (0..PRODUCERS)
        .map(|_| {
            let wheel = Arc::clone(&wheel);
            let tx = tx.clone();
            thread::spawn(move || {
                let mut rng = rand::thread_rng();
                for _ in 0..PER_PRODUCER {
                    let tx = tx.clone();
                    let delay = Duration::from_millis(rng.gen_range(1..800));
                    wheel
                        .schedule(move || tx.send(Instant::now()).unwrap(), delay)
                        .unwrap();
                }
            })
        })
        .collect();
    for producer in producers {
        producer.join().unwrap();
    }
    drop(tx);

    let mut fired = 0usize;
    let mut worst = Duration::ZERO;
    while let Ok(at) = rx.recv_timeout(Duration::from_secs(2)) {
        fired += 1;
        worst = worst.max(at.duration_since(start));
    }

    println!("{fired} timers fired, last one {} millis in", worst.as_millis());
    wheel.shutdown();
    Ok(())
}
