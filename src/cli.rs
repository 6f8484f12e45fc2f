use clap::Parser;
use std::path::PathBuf;

const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Pool:   LRU, default capacity 5\n",
    "HTTP:   reqwest (blocking, range requests)\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Headless shorts-feed simulator for the player pool
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Feed file: one URL per line, or a JSON array of URLs
    #[arg(value_name = "FEED")]
    pub feed: Option<PathBuf>,

    /// Use the in-memory synthetic backend instead of HTTP (no network)
    #[arg(short = 's', long = "synthetic")]
    pub synthetic: bool,

    /// First page shown (0-based)
    #[arg(long = "start", value_name = "N", default_value = "0")]
    pub start_page: usize,

    /// Number of pages to scroll through (default: to the end of the feed)
    #[arg(short = 'n', long = "pages", value_name = "N")]
    pub pages: Option<usize>,

    /// Time spent on each page before scrolling on
    #[arg(short = 'd', long = "dwell-ms", value_name = "MS", default_value = "1500")]
    pub dwell_ms: u64,

    /// Override pool capacity from settings
    #[arg(long = "capacity", value_name = "N")]
    pub capacity: Option<usize>,

    /// Enable debug logging to file (default: reelpool.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    /// Write current settings to reelpool.json and exit
    #[arg(long = "write-config")]
    pub write_config: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["reelpool", "feed.txt"]);
        assert_eq!(args.feed, Some(PathBuf::from("feed.txt")));
        assert_eq!(args.start_page, 0);
        assert_eq!(args.dwell_ms, 1500);
        assert!(args.log_file.is_none());
        assert!(!args.synthetic);
    }

    #[test]
    fn test_flags() {
        let args = Args::parse_from(["reelpool", "-s", "-vv", "--log", "--pages", "4", "--capacity", "3"]);
        assert!(args.synthetic);
        assert_eq!(args.verbosity, 2);
        assert_eq!(args.log_file, Some(None));
        assert_eq!(args.pages, Some(4));
        assert_eq!(args.capacity, Some(3));
    }
}
