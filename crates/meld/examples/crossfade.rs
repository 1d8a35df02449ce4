use std::thread;
use std::time::Duration;

use meld::prelude::*;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("meld=debug".parse()?),
        )
        .init();

    let sink = CollectorSink::new();
    let handle = BlendEngine::spawn(sink.clone(), Tunables::default());

    let desc = VideoDesc::new(
        FourCc::new(*b"GREY"),
        Resolution::new(64, 36).unwrap(),
        Interlacing::Progressive,
        Interval::from_fps(30),
    );

    // Two flat-gray generators; the second comes up late so the engine
    // debounces it, prefills, and crossfades away from the first.
    let producers: Vec<_> = [(SourceId(1), 40u8, 0u64), (SourceId(2), 220u8, 120u64)]
        .into_iter()
        .map(|(id, level, delay_ms)| {
            let handle = handle.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(delay_ms));
                let pool = BufferPool::with_capacity(8, desc.data_len().unwrap_or(0));
                for _ in 0..60 {
                    let Some(mut frame) = Frame::alloc(desc, id, &pool) else {
                        return;
                    };
                    frame.data_mut().fill(level);
                    handle.push(frame, AdmissionMode::Block);
                    thread::sleep(Duration::from_millis(5));
                }
            })
        })
        .collect();

    for producer in producers {
        producer.join().expect("producer panicked");
    }
    handle.finish()?;

    let frames = sink.take_frames();
    let levels: Vec<u8> = frames.iter().map(|f| f.data()[0]).collect();
    println!("presented {} frames", levels.len());
    println!("levels: {levels:?}");

    let metrics = handle.metrics();
    println!(
        "submitted={} promotions={} debounced={} evictions={} underruns={} hard_cuts={}",
        metrics.submitted,
        metrics.promotions,
        metrics.debounced,
        metrics.evictions,
        metrics.underruns,
        metrics.hard_cuts
    );
    Ok(())
}
