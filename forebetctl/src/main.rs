use clap::Parser;

fn main() {
    let cli = forebetctl::Cli::parse();
    if let Err(err) = forebetctl::run(cli) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
