use std::{env, fs, path::PathBuf};

fn fetch_args(cmd: clap::Command) -> clap::Command {
    cmd.arg(clap::arg!(--timeout <SECS> "HTTP timeout in seconds").default_value("15"))
        .arg(clap::arg!(--browserless_token <TOKEN> "Token for the browserless rendering fallback"))
        .arg(clap::arg!(--browserless_url <URL> "Base URL of the browserless service"))
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");
    println!("cargo:rerun-if-env-changed=OUT_DIR");

    let out_dir = PathBuf::from(env::var("OUT_DIR").unwrap());
    let completions_dir = out_dir.join("completions");

    fs::create_dir_all(&completions_dir).unwrap();

    let extract = clap::Command::new("extract")
        .about("Fetch or read a document, extract its content and report its quality")
        .arg(clap::arg!(<INPUT> "URL to fetch, local file, or '-' for stdin"))
        .arg(clap::arg!(--json "Print a JSON report instead of text"))
        .arg(clap::arg!(--strict "Exit with an error when the content does not pass the quality gate"))
        .arg(
            clap::arg!(-o --output <FILE> "Output file (default: stdout)")
                .value_parser(clap::value_parser!(std::path::PathBuf)),
        );

    let analyze = clap::Command::new("analyze")
        .about("Run the full pipeline against a URL and print the resulting record")
        .arg(clap::arg!(<URL> "URL of the document to analyze"))
        .arg(clap::arg!(-i --instructions <TEXT> "What the analysis should focus on"))
        .arg(clap::arg!(--api_key <KEY> "Gemini API key"))
        .arg(clap::arg!(--model <MODEL> "Gemini model name"))
        .arg(
            clap::arg!(--blob_dir <DIR> "Directory for large extracted payloads")
                .value_parser(clap::value_parser!(std::path::PathBuf)),
        )
        .arg(
            clap::arg!(-o --output <FILE> "Output file (default: stdout)")
                .value_parser(clap::value_parser!(std::path::PathBuf)),
        );

    let mut cmd = clap::Command::new("docify")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Turn documentation pages into grid-sized analysis blocks")
        .arg(clap::arg!(-v --verbose "Enable debug logging").global(true))
        .subcommand(fetch_args(extract))
        .subcommand(fetch_args(analyze));

    clap_complete::generate_to(clap_complete::shells::Bash, &mut cmd, "docify", &completions_dir).unwrap();
    clap_complete::generate_to(clap_complete::shells::Zsh, &mut cmd, "docify", &completions_dir).unwrap();
    clap_complete::generate_to(clap_complete::shells::Fish, &mut cmd, "docify", &completions_dir).unwrap();
    clap_complete::generate_to(clap_complete::shells::PowerShell, &mut cmd, "docify", &completions_dir).unwrap();

    println!("cargo:warning=Shell completions generated in: {}", completions_dir.display());
}
