//! Example: list the elevation tiles covering a bounding box.
//!
//! Usage: cargo run --example plan_tiles -- <xmin> <ymin> <xmax> <ymax> [cache_dir]

use std::env;
use std::process;
use std::sync::Arc;
use tnm_common::BoundingBox;
use tnm_dem::{tiles_for_bbox, TileCache};
use tnm_fetch::{FetchConfig, HttpFetcher};

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 5 {
        eprintln!("Usage: {} <xmin> <ymin> <xmax> <ymax> [cache_dir]", args[0]);
        eprintln!("Example: {} -103.0 42.8 -102.5 43.2 ./data/extracted/dem", args[0]);
        process::exit(1);
    }

    let bbox = match args[1..5].join(",").parse::<BoundingBox>() {
        Ok(bbox) => bbox,
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };
    let cache_dir = args.get(5).map(|s| s.as_str()).unwrap_or("data/extracted/dem");

    let fetcher = match HttpFetcher::new(FetchConfig::default()) {
        Ok(fetcher) => Arc::new(fetcher),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(1);
        }
    };
    let cache = TileCache::new(cache_dir, fetcher);

    let tiles = tiles_for_bbox(&bbox);
    println!("{} tiles cover {}", tiles.len(), bbox);
    for key in &tiles {
        let state = if cache.is_cached(key) { "cached" } else { "missing" };
        println!("  {}  {:<7}  {}", key, state, cache.grid().url(key));
    }
}
