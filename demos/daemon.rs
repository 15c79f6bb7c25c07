//
//  Demo host application.
//
//  Creates one server through the embedding API, serves until Enter is
//  pressed, then tears the registry down.
//

use std::error::Error;

use clap::Parser;

use dav_embed::{registry, ConfigBuilder, DEFAULT_ADDRESS, DEFAULT_PORT};

#[derive(Debug, clap::Parser)]
#[command(about, version)]
struct Cli {
    /// address to listen on
    #[arg(short, long, default_value = DEFAULT_ADDRESS)]
    address: String,
    /// port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,
    /// local directory to serve
    #[arg(short, long, default_value = ".")]
    dir: String,
    /// require basic authentication, as USER:PASSWORD
    #[arg(short = 'u', long)]
    auth: Option<String>,
    /// serve over TLS with this PEM certificate
    #[arg(long, requires = "key")]
    cert: Option<String>,
    /// private key for --cert
    #[arg(long, requires = "cert")]
    key: Option<String>,
    /// verbose logging
    #[arg(long)]
    debug: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    let Cli {
        address,
        port,
        dir,
        auth,
        cert,
        key,
        debug,
    } = Cli::parse();

    let mut builder = ConfigBuilder::new(dir)
        .address(address)
        .port(port)
        .debug(debug);
    if let Some(auth) = auth {
        let (user, pass) = auth
            .split_once(':')
            .ok_or("auth must be given as USER:PASSWORD")?;
        builder = builder.credentials(user, pass);
    }
    if let (Some(cert), Some(key)) = (cert, key) {
        builder = builder.tls(cert, key);
    }

    let handle = registry().create(builder.build()?)?;
    registry().start(handle)?;
    println!("{}", registry().info(handle)?);

    println!("Press Enter to stop.");
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;

    registry().cleanup_all();
    Ok(())
}
