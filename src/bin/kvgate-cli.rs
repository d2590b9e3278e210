use std::io::{self, BufRead, Write};

use kvgate::config::Config;
use kvgate::resp;
use kvgate::transport::Transport;

#[tokio::main]
async fn main() -> io::Result<()> {
    let mut config = Config::from_env();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "--host" | "-h" => {
                if i + 1 < args.len() {
                    config.store_host = args[i + 1].clone();
                    i += 1;
                }
            }
            "--port" | "-p" => {
                if i + 1 < args.len() {
                    if let Ok(p) = args[i + 1].parse() {
                        config.store_port = p;
                    }
                    i += 1;
                }
            }
            _ => {}
        }
        i += 1;
    }

    // Each command runs on its own connection, same as the gateway.
    let transport = Transport::new(&config);
    eprintln!("Sending commands to {}", config.store_addr());

    let stdin = io::stdin();
    let mut reader = stdin.lock();

    loop {
        print!("kvgate> ");
        io::stdout().flush()?;

        let mut line = String::new();
        let n = reader.read_line(&mut line)?;
        if n == 0 {
            break; // EOF
        }

        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
            break;
        }

        match transport.execute(&resp::encode_raw(line)).await {
            Ok(raw) => println!("{}", resp::decode(&raw)),
            Err(e) => eprintln!("(error) {e}"),
        }
    }

    Ok(())
}
