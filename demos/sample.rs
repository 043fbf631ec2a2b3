use std::time::{Duration, Instant};

use tickwheel::{TimerResult, TimerWheel};

fn main() -> TimerResult<()> {
    let wheel = TimerWheel::new(64, Duration::from_millis(20))?;
    let (tx, rx) = crossbeam_channel::bounded(1);

    let start = Instant::now();
    wheel.schedule(move || tx.send(()).unwrap(), Duration::from_millis(500))?;

    rx.recv().expect("timer did not fire");
    println!("fired after {} millis", start.elapsed().as_millis());

    wheel.shutdown();
    Ok(())
}
