use crate::CLAP_STYLING;
use clap::{arg, command};
use url::Url;

pub(crate) fn command_argument_builder() -> clap::Command {
    clap::Command::new("webatlas")
        .version(env!("CARGO_PKG_VERSION"))
        .bin_name("webatlas")
        .styles(CLAP_STYLING)
        .arg(arg!(-q --"quiet" "Suppress banner and non-essential output").required(false))
        .subcommand_required(false)
        .subcommand(
            command!("init")
                .about("Initializes the webatlas database on your filesystem")
                .arg(
                    arg!([PATH])
                        .required(false)
                        .help("Location to store the webatlas database")
                        .default_value("~/.config/webatlas/"),
                )
                .arg(
                    arg!(-f --"force")
                        .help(
                            "Forces the overwriting of any existing database at the specified \
                        location.",
                        )
                        .required(false),
                ),
        )
        .subcommand(
            command!("crawl")
                .about(
                    "Crawl a target into a state graph, one breadth-first pass per identity \
                role, surviving interruption via checkpoints.",
                )
                .arg(
                    arg!(-u --"url" <URL>)
                        .required(true)
                        .help("The seed URL to crawl")
                        .value_parser(clap::value_parser!(Url)),
                )
                .arg(
                    arg!(-r --"roles" <ROLES>)
                        .required(false)
                        .help("Comma-separated identity roles, crawled in order")
                        .default_value("default"),
                )
                .arg(
                    arg!(-d --"depth" <DEPTH>)
                        .required(false)
                        .help("Maximum crawl depth (0 = unbounded)")
                        .value_parser(clap::value_parser!(usize))
                        .default_value("3"),
                )
                .arg(
                    arg!(--"timeout" <SECONDS>)
                        .required(false)
                        .help("Navigation timeout in seconds")
                        .value_parser(clap::value_parser!(u64))
                        .default_value("30"),
                )
                .arg(
                    arg!(--"no-deep-scan")
                        .required(false)
                        .help("Skip the one-shot widened link discovery pass")
                        .action(clap::ArgAction::SetTrue),
                )
                .arg(
                    arg!(--"db" <PATH>)
                        .required(false)
                        .help("Database location (default: ~/.config/webatlas/webatlas.db)"),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(false)
                        .help("Write the merged graph as JSON to this file")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                ),
        )
        .subcommand(
            command!("auth")
                .about("Manage stored role identities")
                .subcommand_required(true)
                .subcommand(
                    command!("set")
                        .about("Store or replace a role's credential")
                        .arg(
                            arg!(-r --"role" <ROLE>)
                                .required(true)
                                .help("The role name"),
                        )
                        .arg(
                            arg!(-u --"username" <USERNAME>)
                                .required(true)
                                .help("The login username"),
                        )
                        .arg(
                            arg!(-p --"secret" <SECRET>)
                                .required(true)
                                .help("The login secret"),
                        )
                        .arg(
                            arg!(-l --"login-url" <URL>)
                                .required(true)
                                .help("The login endpoint posted to before the role's pass")
                                .value_parser(clap::value_parser!(Url)),
                        )
                        .arg(
                            arg!(--"db" <PATH>)
                                .required(false)
                                .help("Database location"),
                        ),
                )
                .subcommand(
                    command!("show")
                        .about("Show a role's stored credential (secret redacted)")
                        .arg(
                            arg!(-r --"role" <ROLE>)
                                .required(true)
                                .help("The role name"),
                        )
                        .arg(
                            arg!(--"db" <PATH>)
                                .required(false)
                                .help("Database location"),
                        ),
                ),
        )
        .subcommand(
            command!("export")
                .about("Export a finished session's merged graph as JSON")
                .arg(
                    arg!(-s --"session" <SESSION_ID>)
                        .required(true)
                        .help("The session to export"),
                )
                .arg(
                    arg!(-o --"output" <PATH>)
                        .required(true)
                        .help("Output file path")
                        .value_parser(clap::value_parser!(std::path::PathBuf)),
                )
                .arg(
                    arg!(--"db" <PATH>)
                        .required(false)
                        .help("Database location"),
                ),
        )
}
