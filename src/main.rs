use bitleech::config::Cfg;
use bitleech::logger::Logger;
use bitleech::metainfo::TorrentFile;
use bitleech::swarm::SwarmDriver;
use rand::Rng;
use std::env;
use std::path::Path;
use std::process::ExitCode;

const PEER_ID_PREFIX: &str = "-BL0001-";

fn main() -> ExitCode {
    let arguments: Vec<String> = env::args().collect();
    if arguments.len() != 3 {
        eprintln!(
            "usage: {} <torrent-file> <output-directory>",
            arguments.first().map(String::as_str).unwrap_or("bitleech")
        );
        return ExitCode::FAILURE;
    }
    let torrent_path = Path::new(&arguments[1]);
    let output_dir = Path::new(&arguments[2]);

    let cfg = match Cfg::load_or_default(Path::new("config.cfg")) {
        Ok(cfg) => cfg,
        Err(err) => {
            eprintln!("invalid config.cfg: {:?}", err);
            return ExitCode::FAILURE;
        }
    };

    let logger = match Logger::new(Path::new(&cfg.log_directory)) {
        Ok(logger) => logger,
        Err(err) => {
            eprintln!("could not start logger: {:?}", err);
            return ExitCode::FAILURE;
        }
    };
    let logger_sender = logger.new_sender();

    let torrent = match TorrentFile::load(torrent_path) {
        Ok(torrent) => torrent,
        Err(err) => {
            let _ = logger_sender.error(&format!("failed to load torrent file: {:?}", err));
            return ExitCode::FAILURE;
        }
    };

    let peer_id = generate_peer_id();
    let _ = logger_sender.info(&format!(
        "downloading '{}' ({} pieces) to {}",
        torrent.name,
        torrent.total_pieces(),
        output_dir.display()
    ));

    let driver = SwarmDriver::new(peer_id, cfg, logger_sender.clone());
    match driver.run(&torrent, output_dir) {
        Ok(()) => {
            let _ = logger_sender.info("download complete");
            ExitCode::SUCCESS
        }
        Err(err) => {
            let _ = logger_sender.error(&format!("download did not complete: {:?}", err));
            ExitCode::FAILURE
        }
    }
}

/// Builds a 20-byte Azureus-style peer id: an 8-byte client tag followed
/// by 12 random digits (teacher's `dtorrent::bt_client::btclient::generate_peer_id`,
/// widened from its random-digit-string scheme to the fixed 20-byte field
/// the wire protocol requires).
fn generate_peer_id() -> [u8; 20] {
    let mut id = [0u8; 20];
    id[..PEER_ID_PREFIX.len()].copy_from_slice(PEER_ID_PREFIX.as_bytes());

    let mut rng = rand::thread_rng();
    for slot in id[PEER_ID_PREFIX.len()..].iter_mut() {
        *slot = b'0' + rng.gen_range(0..10);
    }
    id
}
