//! Opening the user's browser for the login redirect.

use std::{
    env,
    process::{Command, Stdio},
};
use tracing::debug;

use crate::errors::ClientResult;

pub trait BrowserLauncher: Send + Sync {
    /// Whether a browser can be shown at all. False on headless machines.
    fn is_available(&self) -> bool;

    fn open(&self, url: &str) -> ClientResult<()>;
}

/// Launches `$BROWSER` or the platform's URL opener.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemBrowser;

impl BrowserLauncher for SystemBrowser {
    fn is_available(&self) -> bool {
        browser_override().is_some() || has_display()
    }

    fn open(&self, url: &str) -> ClientResult<()> {
        let (program, args) = match browser_override() {
            Some(template) => command_from_template(&template, url),
            None => platform_opener(url),
        };
        debug!(program = %program, "opening browser");
        Command::new(&program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        Ok(())
    }
}

fn browser_override() -> Option<String> {
    env::var("BROWSER")
        .ok()
        .and_then(|value| value.split(':').next().map(str::trim).map(str::to_string))
        .filter(|value| !value.is_empty())
}

#[cfg(target_os = "linux")]
fn has_display() -> bool {
    ["DISPLAY", "WAYLAND_DISPLAY"]
        .iter()
        .any(|var| env::var_os(var).is_some_and(|value| !value.is_empty()))
}

#[cfg(not(target_os = "linux"))]
fn has_display() -> bool {
    true
}

/// `$BROWSER` may contain `%s` where the URL goes; otherwise it is appended.
fn command_from_template(template: &str, url: &str) -> (String, Vec<String>) {
    let mut parts = template.split_whitespace().map(str::to_string);
    let program = parts.next().unwrap_or_default();
    let mut args: Vec<String> = parts.collect();
    if args.iter().any(|arg| arg.contains("%s")) {
        for arg in &mut args {
            *arg = arg.replace("%s", url);
        }
    } else {
        args.push(url.to_string());
    }
    (program, args)
}

fn platform_opener(url: &str) -> (String, Vec<String>) {
    if cfg!(target_os = "macos") {
        ("open".into(), vec![url.into()])
    } else if cfg!(windows) {
        windows_opener(url)
    } else {
        ("xdg-open".into(), vec![url.into()])
    }
}

/// `cmd /C start` re-parses its command line and splits at `&`, so the
/// authorize URL's query string would be cut short.
fn windows_opener(url: &str) -> (String, Vec<String>) {
    (
        "rundll32".into(),
        vec!["url.dll,FileProtocolHandler".into(), url.into()],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_substitutes_url() {
        let (program, args) = command_from_template("firefox --new-tab %s", "http://x/");
        assert_eq!(program, "firefox");
        assert_eq!(args, vec!["--new-tab", "http://x/"]);
    }

    #[test]
    fn template_without_placeholder_appends_url() {
        let (program, args) = command_from_template("w3m", "http://x/");
        assert_eq!(program, "w3m");
        assert_eq!(args, vec!["http://x/"]);
    }

    #[test]
    fn windows_opener_passes_query_string_as_one_argument() {
        let url = "https://idp.example/oauth2/authorize?response_type=token&client_id=cli&state=abc";
        let (program, args) = windows_opener(url);
        assert_eq!(program, "rundll32");
        assert_eq!(args.last().map(String::as_str), Some(url));
        assert!(args.iter().all(|arg| arg == url || !arg.contains('&')));
        assert_ne!(program, "cmd");
    }
}
