use commands::command_argument_builder;
use handlers::print_banner;

mod commands;
mod handlers;

#[tokio::main]
async fn main() {
    let cmd = command_argument_builder();
    let chosen_command = cmd.get_matches();
    let quiet = chosen_command.get_flag("quiet");

    if !quiet {
        print_banner();
    }

    if chosen_command.subcommand().is_none() {
        return;
    }

    let result = match chosen_command.subcommand() {
        Some(("init", primary_command)) => handlers::handle_init(primary_command),
        Some(("crawl", primary_command)) => handlers::handle_crawl(primary_command, quiet).await,
        Some(("auth", primary_command)) => match primary_command.subcommand() {
            Some(("set", secondary_command)) => handlers::handle_auth_set(secondary_command),
            Some(("show", secondary_command)) => handlers::handle_auth_show(secondary_command),
            _ => unreachable!("clap should ensure we don't get here"),
        },
        Some(("export", primary_command)) => handlers::handle_export(primary_command),
        _ => unreachable!("clap should ensure we don't get here"),
    };

    if let Err(e) = result {
        eprintln!("error: {:#}", e);
        std::process::exit(1);
    }
}

pub const CLAP_STYLING: clap::builder::styling::Styles = clap::builder::styling::Styles::styled()
    .header(clap_cargo::style::HEADER)
    .usage(clap_cargo::style::USAGE)
    .literal(clap_cargo::style::LITERAL)
    .placeholder(clap_cargo::style::PLACEHOLDER)
    .error(clap_cargo::style::ERROR)
    .valid(clap_cargo::style::VALID)
    .invalid(clap_cargo::style::INVALID);
