//! Smoke-test driver: writes N dummy tracks to a fixed output path.

use std::mem;

use clap::Parser;
use store::chunked::ChunkedFile;
use store::layout::DataLayout;
use store::layout::Record;
use store::Writer;
use store::DEFAULT_COMPRESSION_LEVEL;
use tracing::info;
use tracing::metadata::LevelFilter;
use tracing_subscriber::FmtSubscriber;

const OUT_PATH: &str = "test.store";
const BATCH_SIZE: usize = 256;

#[repr(C)]
#[derive(Debug, Copy, Clone)]
struct Track {
    pt: f32,
    mask: bool,
}

unsafe impl Record for Track {
    fn layout() -> DataLayout {
        DataLayout::Compound {
            size: mem::size_of::<Track>(),
            fields: vec![store::field!(Track, pt), store::field!(Track, mask)],
        }
    }

    fn sentinel() -> Self {
        Track {
            pt: 0.0,
            mask: false,
        }
    }
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// number of dummy records to write
    #[arg(default_value_t = 0)]
    n: usize,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(LevelFilter::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let mut out = ChunkedFile::create(OUT_PATH)?;
    let mut tracks = Writer::new(
        &mut out,
        "tracks",
        cli.n,
        BATCH_SIZE,
        DEFAULT_COMPRESSION_LEVEL,
    )?;

    let test_tracks = vec![Track::sentinel(); cli.n];
    for _ in 0..cli.n {
        tracks.add(test_tracks.clone())?;
    }
    tracks.flush()?;
    tracks.close()?;
    info!("wrote {} records to {:?}", cli.n, OUT_PATH);

    Ok(())
}
