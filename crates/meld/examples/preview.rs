use std::thread;
use std::time::Duration;

use meld::preview::WindowSink;
use meld::prelude::*;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("meld=debug".parse()?),
        )
        .init();

    let handle = BlendEngine::spawn(WindowSink::new("meld preview"), Tunables::default());

    let desc = VideoDesc::new(
        FourCc::new(*b"GREY"),
        Resolution::new(320, 180).unwrap(),
        Interlacing::Progressive,
        Interval::from_fps(30),
    );

    // Two synthetic sources: a slow pulse and a bright one arriving
    // later, so the window shows the crossfade between them.
    let producers: Vec<_> = [(SourceId(1), 0u8, 0u64), (SourceId(2), 128u8, 2_000u64)]
        .into_iter()
        .map(|(id, base, delay_ms)| {
            let handle = handle.clone();
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(delay_ms));
                let pool = BufferPool::with_capacity(8, desc.data_len().unwrap_or(0));
                for tick in 0u32..300 {
                    let Some(mut frame) = Frame::alloc(desc, id, &pool) else {
                        return;
                    };
                    let level = base.wrapping_add(((tick * 2) % 128) as u8);
                    frame.data_mut().fill(level);
                    if handle.push(frame, AdmissionMode::Block) != PushOutcome::Accepted {
                        return;
                    }
                    thread::sleep(Duration::from_millis(33));
                }
            })
        })
        .collect();

    for producer in producers {
        producer.join().expect("producer panicked");
    }
    handle.finish()?;

    let metrics = handle.metrics();
    println!(
        "submitted={} promotions={} evictions={}",
        metrics.submitted, metrics.promotions, metrics.evictions
    );
    Ok(())
}
