mod args;


use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use ldapfix::ldap::LdapConnection;
use ldapfix::{
    CancelFlag, DumpOptions, Format, FormatHandler, FormatKind, LoadOptions, TinyDirectory,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::args::{ConnectionOpts, ConvertOpts, Credentials, DumpOpts, LoadOpts, Mode, Opts};


fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}


fn handler_mode(strict: bool) -> ldapfix::Mode {
    if strict { ldapfix::Mode::Strict } else { ldapfix::Mode::Tolerant }
}


fn connect(opts: &ConnectionOpts) -> anyhow::Result<LdapConnection> {
    let timeout = opts.timeout.map(Duration::from_secs);
    let mut connection = LdapConnection::connect(&opts.ldap_uri, timeout)?;

    // obtain credentials
    let (bind_dn, password) = if let Some(bind_dn) = &opts.bind_dn {
        let password = rpassword::prompt_password("LDAP password: ")
            .context("failed to read LDAP password")?;
        (bind_dn.clone(), password)
    } else if let Some(credentials_file) = &opts.credentials_file {
        let credentials_string = std::fs::read_to_string(credentials_file)
            .with_context(|| format!("failed to read credentials file {}", credentials_file.display()))?;
        let credentials: Credentials = toml::from_str(&credentials_string)
            .context("failed to parse credentials file")?;
        (credentials.bind_dn, credentials.password)
    } else {
        bail!("either a bind DN or a credentials file is required");
    };

    connection.bind(&bind_dn, &password)?;
    Ok(connection)
}


fn disconnect(connection: LdapConnection) {
    if let Err(e) = connection.unbind() {
        warn!(error = %e, "unbind failed");
    }
}


fn open_input(path: &Path) -> anyhow::Result<BufReader<File>> {
    let file = File::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    Ok(BufReader::new(file))
}


fn open_output(path: Option<&Path>) -> anyhow::Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create {}", path.display()))?;
            Box::new(BufWriter::new(file))
        },
        None => Box::new(io::stdout().lock()),
    })
}


fn run_load(opts: LoadOpts, cancel: CancelFlag) -> anyhow::Result<()> {
    let format = opts.format.unwrap_or_else(|| FormatKind::from_path(&opts.input));
    let mut input = open_input(&opts.input)?;
    let mut connection = connect(&opts.connection)?;

    let options = LoadOptions {
        ignore_errors: opts.ignore_errors,
        mode: handler_mode(opts.strict),
        cancel: Some(cancel),
    };
    let result = FormatHandler::new(format).load(&mut connection, &mut input, &options);
    disconnect(connection);

    let summary = result?;
    info!(
        input = %opts.input.display(),
        applied = summary.applied,
        skipped = summary.skipped,
        "load done"
    );
    if !summary.complete {
        warn!("the input was not loaded completely");
    }
    Ok(())
}


fn run_dump(opts: DumpOpts, cancel: CancelFlag) -> anyhow::Result<()> {
    let format = opts.format
        .or_else(|| opts.output.as_deref().map(FormatKind::from_path))
        .unwrap_or(FormatKind::Ldif);
    let mut output = open_output(opts.output.as_deref())?;
    let mut connection = connect(&opts.connection)?;

    let options = DumpOptions { mode: handler_mode(opts.strict), cancel: Some(cancel) };
    let result = FormatHandler::new(format)
        .dump(&mut connection, &opts.base, &opts.filter, &mut *output, &options);
    disconnect(connection);

    let summary = result?;
    info!(base = opts.base.as_str(), written = summary.written, "dump done");
    if !summary.complete {
        warn!("the search results were not written completely");
    }
    Ok(())
}


fn run_convert(opts: ConvertOpts, cancel: CancelFlag) -> anyhow::Result<()> {
    let from = opts.from.unwrap_or_else(|| FormatKind::from_path(&opts.input));
    let to = opts.to
        .or_else(|| opts.output.as_deref().map(FormatKind::from_path))
        .unwrap_or(match from {
            FormatKind::Ldif => FormatKind::Dsml,
            FormatKind::Dsml => FormatKind::Ldif,
        });

    let mut directory = TinyDirectory::new();
    let mut input = open_input(&opts.input)?;
    let load_options = LoadOptions {
        ignore_errors: opts.ignore_errors,
        mode: ldapfix::Mode::Strict,
        cancel: Some(cancel.clone()),
    };
    let loaded = FormatHandler::new(from).load(&mut directory, &mut input, &load_options)?;
    if !loaded.complete {
        bail!("conversion of {} was interrupted", opts.input.display());
    }

    let mut output = open_output(opts.output.as_deref())?;
    let dump_options = DumpOptions { mode: ldapfix::Mode::Strict, cancel: Some(cancel) };
    let dumped = FormatHandler::new(to)
        .dump(&mut directory, &opts.base, &opts.filter, &mut *output, &dump_options)?;
    info!(
        from = from.name(),
        to = to.name(),
        read = loaded.applied,
        skipped = loaded.skipped,
        written = dumped.written,
        "convert done"
    );
    Ok(())
}


fn main() -> anyhow::Result<()> {
    let opts = Opts::parse();
    init_logging(opts.verbose);

    let cancel = CancelFlag::new();
    let handler_cancel = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_cancel.cancel()) {
        warn!(error = %e, "failed to install the Ctrl-C handler");
    }

    match opts.mode {
        Mode::Load(load) => run_load(load, cancel),
        Mode::Dump(dump) => run_dump(dump, cancel),
        Mode::Convert(convert) => run_convert(convert, cancel),
    }
}
