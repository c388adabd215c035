use std::env;
use std::path::PathBuf;
use std::process;
use tracing::error;
use tracing_subscriber::EnvFilter;

const VERSION: &str = concat!("luabridge-demo ", env!("CARGO_PKG_VERSION"));
const DEFAULT_SCRIPT: &str = "test.lua";

fn print_usage() {
    eprintln!("usage: luabridge-demo [options] [script]");
    eprintln!("Available options are:");
    eprintln!("  -h            show this help");
    eprintln!("  -v            show version information");
    eprintln!("  --log filter  tracing filter (default 'info', or RUST_LOG)");
    eprintln!("  --            stop handling options");
    eprintln!("The script defaults to '{}'.", DEFAULT_SCRIPT);
}

#[derive(Default)]
struct Options {
    script: Option<PathBuf>,
    log_filter: Option<String>,
    show_help: bool,
    show_version: bool,
}

fn parse_args() -> Result<Options, String> {
    let args: Vec<String> = env::args().collect();
    let mut opts = Options::default();
    let mut stop_options = false;
    let mut i = 1;

    while i < args.len() {
        let arg = &args[i];
        if !stop_options && arg.starts_with('-') {
            match arg.as_str() {
                "-h" | "--help" => opts.show_help = true,
                "-v" => opts.show_version = true,
                "--log" => {
                    i += 1;
                    if i >= args.len() {
                        return Err("'--log' needs argument".to_string());
                    }
                    opts.log_filter = Some(args[i].clone());
                }
                "--" => stop_options = true,
                _ => return Err(format!("unrecognized option '{}'", arg)),
            }
        } else if opts.script.is_none() {
            opts.script = Some(PathBuf::from(arg));
        } else {
            return Err(format!("unexpected argument '{}'", arg));
        }
        i += 1;
    }

    Ok(opts)
}

fn init_logging(filter: Option<&str>) {
    let filter = match filter {
        Some(f) => EnvFilter::new(f),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn main() {
    let opts = match parse_args() {
        Ok(opts) => opts,
        Err(msg) => {
            eprintln!("luabridge-demo: {}", msg);
            print_usage();
            process::exit(1);
        }
    };

    if opts.show_help {
        print_usage();
        return;
    }
    if opts.show_version {
        println!("{}", VERSION);
        return;
    }

    init_logging(opts.log_filter.as_deref());

    let script = opts.script.unwrap_or_else(|| PathBuf::from(DEFAULT_SCRIPT));
    if let Err(e) = luabridge_demo::run_all(&script) {
        error!(kind = %e.kind(), "{}", e);
        process::exit(1);
    }
}
