mod audio;
mod central;
mod config;
mod node;
mod settings;
mod socket;
mod thread;
mod time;

use std::process::ExitCode;

use structopt::StructOpt;

#[derive(StructOpt)]
enum Opt {
    /// Broadcast timestamped beacons and issue recording commands
    Central(central::CentralOpt),
    /// Follow a central's beacon stream and record synchronized audio
    Node(node::NodeOpt),
}

#[derive(Debug)]
pub enum RunError {
    Listen(socket::ListenError),
    Io(std::io::Error),
    Thread(std::io::Error),
    Pipeline(chord_core::audio::PipelineError),
    Settings(settings::SettingsError),
    Codec(chord_core::codec::CodecError),
    CaptureSetup(chord_core::capture::RegistryFull),
}

fn main() -> Result<(), ExitCode> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Some(config) = config::read() {
        config::load_into_env(&config);
    }

    let opt = Opt::from_args();

    let result = match opt {
        Opt::Central(opt) => central::run(opt),
        Opt::Node(opt) => node::run(opt),
    };

    result.map_err(|err| {
        eprintln!("error: {err:?}");
        ExitCode::FAILURE
    })
}
