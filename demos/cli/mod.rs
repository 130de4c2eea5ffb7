use std::env;
use std::process;

use megafs::{ClientConfig, Mega};
use tracing_subscriber::{fmt, EnvFilter};

pub fn usage_and_exit(usage: &str) -> ! {
    eprintln!("{usage}");
    process::exit(1);
}

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("megafs=debug"));
    fmt().with_env_filter(filter).with_target(false).init();
}

pub struct ArgParser {
    args: Vec<String>,
    usage: &'static str,
}

impl ArgParser {
    pub fn new(usage: &'static str) -> Self {
        let args: Vec<String> = env::args().skip(1).collect();

        if args.iter().any(|a| a == "--help" || a == "-h") {
            println!("{usage}");
            process::exit(0);
        }

        Self { args, usage }
    }

    pub fn take_value(&mut self, names: &[&str]) -> Option<String> {
        let i = self.args.iter().position(|a| names.contains(&a.as_str()))?;
        let value = self.args.get(i + 1).cloned();
        if value.is_none() {
            usage_and_exit(self.usage);
        }
        self.args.drain(i..=i + 1);
        value
    }

    pub fn remaining(self) -> Vec<String> {
        self.args
    }
}

pub struct Credentials {
    pub email: String,
    pub password: String,
    pub mfa: Option<String>,
    pub proxy: Option<String>,
    pub positionals: Vec<String>,
}

impl Credentials {
    /// Build a client and log in with these credentials.
    pub async fn login(&self) -> megafs::Result<Mega> {
        let mut config = ClientConfig::default();
        if let Some(proxy) = &self.proxy {
            config = config.with_proxy(proxy.clone());
        }
        let mega = Mega::with_config(config)?;
        mega.login(&self.email, &self.password, self.mfa.as_deref()).await?;
        Ok(mega)
    }
}

pub fn parse_credentials(usage: &'static str) -> Credentials {
    let mut parser = ArgParser::new(usage);
    let email = parser
        .take_value(&["--email", "-e"])
        .unwrap_or_else(|| usage_and_exit(usage));
    let password = parser
        .take_value(&["--password", "-p"])
        .unwrap_or_else(|| usage_and_exit(usage));
    let mfa = parser.take_value(&["--mfa"]);
    let proxy = parser.take_value(&["--proxy"]);

    Credentials {
        email,
        password,
        mfa,
        proxy,
        positionals: parser.remaining(),
    }
}
