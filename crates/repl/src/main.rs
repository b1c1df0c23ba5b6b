use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::thread::JoinHandle;

use clap::Parser;
use color_eyre::eyre::{self, Context};
use config::Config;
use crossbeam_channel::Receiver;
use debugger::{Incoming, Session, Status};
use launcher::{ProgramSettings, TargetKind};
use tracing_subscriber::filter::EnvFilter;

use crate::command::{BreakTarget, Command};

mod command;
mod output;

const PROMPT: &str = "(gldb) ";

/// Host a tcp target is reached on when none is configured
const DEFAULT_HOST: &str = "localhost";

struct App {
    session: Session,
    json: bool,
    input_rx: Receiver<String>,
    /// the next loop step should show a prompt
    prompt: bool,

    #[allow(dead_code)]
    input_thread: JoinHandle<()>,
}

impl App {
    fn new(session: Session, json: bool) -> Self {
        // handle input; the sender is dropped at end of input
        let (input_tx, input_rx) = crossbeam_channel::unbounded();
        let input_thread = std::thread::spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else {
                    break;
                };
                if input_tx.send(line).is_err() {
                    break;
                }
            }
        });

        Self {
            session,
            json,
            input_rx,
            prompt: true,
            input_thread,
        }
    }

    fn loop_step(&mut self) -> eyre::Result<ShouldQuit> {
        for response in self.session.take_deferred() {
            if let Some(line) = output::describe(&response.body) {
                println!("{line}");
                self.prompt = true;
            }
        }

        if self.prompt {
            print!("{PROMPT}");
            std::io::stdout().flush()?;
            self.prompt = false;
        }

        let incoming = self.session.incoming();
        crossbeam_channel::select! {
            recv(self.input_rx) -> input => {
                self.prompt = true;
                match input {
                    Ok(input) => self.handle_input(&input),
                    // end of input behaves like quit
                    Err(_) => self.handle_command(Command::Quit),
                }
            }
            recv(incoming) -> incoming => {
                match incoming {
                    Ok(incoming) => self.handle_incoming(incoming),
                    Err(_) => self.program_exited(),
                }
                Ok(ShouldQuit::False)
            }
        }
    }

    #[tracing::instrument(skip(self, incoming))]
    fn handle_incoming(&mut self, incoming: Incoming) {
        match self.session.handle(incoming) {
            Ok(response) => {
                tracing::debug!(id = response.id, code = response.body.code(), "response");
                if let Some(line) = output::describe(&response.body) {
                    println!("\n{line}");
                    self.prompt = true;
                }
            }
            Err(e) => {
                tracing::debug!(error = ?e, "channel to traced program closed");
                self.program_exited();
            }
        }
    }

    fn program_exited(&mut self) {
        self.session.set_status(Status::Dead);
        // reap the process
        if let Err(e) = self.session.kill() {
            tracing::warn!(error = ?e, "could not clean up traced program");
        }
        println!("\nProgram exited.");
        self.prompt = true;
    }

    fn handle_input(&mut self, input: &str) -> eyre::Result<ShouldQuit> {
        match command::parse(input) {
            Ok(Some(command)) => self.handle_command(command),
            Ok(None) => Ok(ShouldQuit::False),
            Err(e) => {
                println!("{e}");
                Ok(ShouldQuit::False)
            }
        }
    }

    /// Whether the program is in a status that allows the command,
    /// explaining why not when it isn't
    fn check(&self, command: &Command) -> bool {
        let status = self.session.status();
        let problem = match (command, status) {
            (Command::Run, Status::Dead) => None,
            (Command::Run, _) => Some("Already running."),
            (
                Command::Break { .. } | Command::Status | Command::Quit,
                _,
            ) => None,
            (_, Status::Dead) => Some("Program is not running."),
            (Command::Continue | Command::Step, Status::Stopped) => None,
            (Command::Continue | Command::Step, _) => Some("Program is not stopped."),
            (Command::Interrupt, Status::Stopped) => Some("Program is already stopped."),
            _ => None,
        };
        if let Some(problem) = problem {
            println!("{problem}");
        }
        problem.is_none()
    }

    #[tracing::instrument(skip(self))]
    fn handle_command(&mut self, command: Command) -> eyre::Result<ShouldQuit> {
        if !self.check(&command) {
            return Ok(ShouldQuit::False);
        }

        match command {
            Command::Run => {
                self.session.run().context("running program")?;
            }
            Command::Continue => {
                self.session.send_continue()?;
            }
            Command::Step => {
                self.session.send_step()?;
            }
            Command::Interrupt => {
                self.session.send_async()?;
            }
            Command::Break { target, enabled } => match target {
                BreakTarget::Function(function) => {
                    self.session.set_breakpoint(&function, enabled)?;
                }
                BreakTarget::Event(event) => {
                    self.session.set_break_event(event, enabled)?;
                }
            },
            Command::State { path } => {
                let tree = self.session.state_tree()?;
                let node = match &path {
                    Some(path) => tree
                        .find(path)
                        .ok_or_else(|| eyre::eyre!("No state named {path}"))?,
                    None => tree,
                };
                if self.json {
                    println!("{}", output::format_tree_json(node)?);
                } else {
                    print!("{}", output::format_tree(node));
                }
            }
            Command::Data(request) => {
                let data = self.session.fetch_data(request)?;
                println!("{}", output::format_data(&data));
            }
            Command::Module { name, activate } => {
                self.session.send_module(&name, activate)?;
            }
            Command::Backtrace => {
                if self.session.settings().target != TargetKind::Local {
                    println!("Backtraces are only available for local programs.");
                    return Ok(ShouldQuit::False);
                }
                let pid = self
                    .session
                    .pid()
                    .ok_or_else(|| eyre::eyre!("Program has not reported its pid yet"))?;
                for frame in launcher::backtrace(pid).context("taking backtrace")? {
                    println!("{frame}");
                }
            }
            Command::Status => match self.session.pid() {
                Some(pid) => println!("Program is {} (pid {pid}).", self.session.status()),
                None => println!("Program is {}.", self.session.status()),
            },
            Command::Kill => {
                self.session.kill().context("killing program")?;
                println!("Program killed.");
            }
            Command::Quit => {
                self.session.kill().context("shutting down")?;
                return Ok(ShouldQuit::True);
            }
        }
        Ok(ShouldQuit::False)
    }
}

#[derive(Debug, Parser)]
#[command(version, about = "Debugger for OpenGL programs")]
struct Args {
    /// Where the program runs
    #[clap(long)]
    target: Option<TargetKind>,

    /// Host for ssh and tcp targets
    #[clap(long)]
    host: Option<String>,

    /// Port for tcp targets
    #[clap(long)]
    port: Option<u16>,

    /// Filter chain to install in the traced program
    #[clap(long)]
    chain: Option<String>,

    /// X display for local targets
    #[clap(long)]
    display: Option<String>,

    /// Break on a function, or on `error`, `compile-error` or `link-error`
    #[clap(short, long = "break", value_name = "FUNCTION")]
    breakpoints: Vec<String>,

    /// Configuration file to use instead of the default
    #[clap(long)]
    config: Option<PathBuf>,

    /// Print state trees as JSON
    #[clap(long)]
    json: bool,

    /// Program to run, with its arguments
    #[clap(last = true)]
    command: Vec<String>,
}

impl Args {
    /// Layer command-line values over the configured settings
    fn apply(&self, settings: &mut ProgramSettings) {
        if let Some(target) = self.target {
            settings.target = target;
        }
        if !self.command.is_empty() {
            settings.command = Some(self.command.join(" "));
        }
        for (value, slot) in [
            (&self.host, &mut settings.host),
            (&self.chain, &mut settings.chain),
            (&self.display, &mut settings.display),
        ] {
            if value.is_some() {
                slot.clone_from(value);
            }
        }
        if self.port.is_some() {
            settings.port = self.port;
        }
        if settings.target == TargetKind::Tcp {
            settings.host.get_or_insert_with(|| DEFAULT_HOST.to_string());
            settings.port.get_or_insert(transport::DEFAULT_PORT);
        }
    }
}

fn main() -> eyre::Result<()> {
    color_eyre::install().context("installing color_eyre")?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    }
    .context("loading configuration")?;

    let mut settings = config.program_settings();
    args.apply(&mut settings);
    tracing::debug!(?settings, "program settings");

    let mut session = Session::new(settings);
    for function in &config.breakpoints.functions {
        session.set_breakpoint(function, true)?;
    }
    for (event, enabled) in config.breakpoints.event_flags()? {
        session.set_break_event(event, enabled)?;
    }
    for breakpoint in &args.breakpoints {
        tracing::debug!(%breakpoint, "adding breakpoint");
        match BreakTarget::parse(breakpoint) {
            BreakTarget::Function(function) => session.set_breakpoint(&function, true)?,
            BreakTarget::Event(event) => session.set_break_event(event, true)?,
        };
    }
    tracing::debug!("breakpoints added");

    let mut app = App::new(session, args.json);
    loop {
        match app.loop_step() {
            Ok(ShouldQuit::True) => break,
            Ok(ShouldQuit::False) => {}
            Err(e) => {
                println!("Error: {e:#}");
                app.prompt = true;
            }
        }
    }

    Ok(())
}

enum ShouldQuit {
    True,
    False,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_line_overrides_configuration() {
        let args = Args::parse_from([
            "gldb",
            "--target",
            "ssh",
            "--host",
            "render-box",
            "--break",
            "glFlush",
            "--",
            "./demo",
            "--fullscreen",
        ]);
        let mut settings = ProgramSettings {
            command: Some("./other".to_string()),
            chain: Some("trace".to_string()),
            ..Default::default()
        };
        args.apply(&mut settings);

        assert_eq!(settings.target, TargetKind::Ssh);
        assert_eq!(settings.host.as_deref(), Some("render-box"));
        assert_eq!(settings.command.as_deref(), Some("./demo --fullscreen"));
        assert_eq!(settings.chain.as_deref(), Some("trace"));
        assert_eq!(args.breakpoints, vec!["glFlush".to_string()]);
    }

    #[test]
    fn tcp_targets_default_to_the_local_port() {
        let args = Args::parse_from(["gldb", "--target", "tcp"]);
        let mut settings = ProgramSettings::default();
        args.apply(&mut settings);
        assert_eq!(settings.host.as_deref(), Some("localhost"));
        assert_eq!(settings.port, Some(transport::DEFAULT_PORT));

        let args = Args::parse_from(["gldb", "--target", "tcp", "--port", "9200"]);
        args.apply(&mut settings);
        assert_eq!(settings.port, Some(9200));
    }

    #[test]
    fn bad_target_is_rejected() {
        let err = Args::try_parse_from(["gldb", "--target", "serial"]).expect_err("no such target");
        assert!(err.to_string().contains("unknown target 'serial'"));
    }
}
