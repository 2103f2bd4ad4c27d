//! Remote command rendering
//!
//! A wrapped command becomes a small shell script that enters the remote
//! workspace, sources the environment-init file when present, moves to the
//! directory mirroring the local cwd and exports extra variables before
//! running the user command. Everything runs in one ssh session so state set
//! by the init file is visible to the command.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::workspace::ENV_INIT_FILE;

/// A command to run on a host
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RemoteCommand {
    argv: Vec<String>,
    env: BTreeMap<String, String>,
    working_subdir: PathBuf,
    /// Run from the remote home with no wrapping
    raw: bool,
}

impl RemoteCommand {
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// A command run verbatim from the remote home directory
    pub fn raw(command: impl Into<String>) -> Self {
        Self {
            argv: vec![command.into()],
            raw: true,
            ..Self::default()
        }
    }

    /// Login shell inside the workspace
    pub fn login_shell() -> Self {
        Self::new([r#"exec "${SHELL:-sh}" -l"#])
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_envs<I, K, V>(mut self, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.env
            .extend(vars.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Directory, relative to the workspace root, the command starts in
    pub fn in_subdir(mut self, subdir: impl Into<PathBuf>) -> Self {
        self.working_subdir = subdir.into();
        self
    }

    pub fn is_raw(&self) -> bool {
        self.raw
    }

    pub fn working_subdir(&self) -> &Path {
        &self.working_subdir
    }

    /// The user command as one shell string.
    ///
    /// A single argument is taken as an already formatted command line.
    pub fn command_line(&self) -> String {
        match self.argv.as_slice() {
            [single] => single.clone(),
            argv => shell_words::join(argv.iter().filter(|a| !a.is_empty())),
        }
    }

    /// Script sent to the remote shell for a workspace at `remote_dir`
    pub fn render(&self, remote_dir: &str, dry_run: bool) -> String {
        let command = self.command_line();
        if dry_run {
            return format!("echo {}", shell_words::quote(&command));
        }
        if self.raw {
            return command;
        }

        let mut script = vec![
            format!("cd {}", shell_words::quote(remote_dir)),
            format!("if [ -f {0} ]; then\n  . ./{0}\nfi", ENV_INIT_FILE),
        ];

        let subdir = self.working_subdir.to_string_lossy();
        if !subdir.is_empty() && subdir != "." {
            script.push(format!("cd {}", shell_words::quote(&subdir)));
        }

        for (key, value) in &self.env {
            script.push(format!(
                "export {}={}",
                shell_words::quote(key),
                shell_words::quote(value)
            ));
        }

        script.push(command);
        script.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_argument_is_verbatim() {
        let command = RemoteCommand::new(["make test && echo done"]);
        assert_eq!(command.command_line(), "make test && echo done");
    }

    #[test]
    fn test_multiple_arguments_are_quoted() {
        let command = RemoteCommand::new(["grep", "-r", "two words", "src"]);
        assert_eq!(command.command_line(), "grep -r 'two words' src");
    }

    #[test]
    fn test_render_sources_env_file_before_command() {
        let script = RemoteCommand::new(["make"]).render(".remotes/project_1234abcd", false);
        assert_eq!(
            script,
            "cd .remotes/project_1234abcd\nif [ -f .remoteenv ]; then\n  . ./.remoteenv\nfi\nmake"
        );
    }

    #[test]
    fn test_render_subdir_and_sorted_env() {
        let script = RemoteCommand::new(["cargo", "test"])
            .in_subdir("crates/core")
            .with_env("ZED", "last")
            .with_env("ALPHA", "has space")
            .render("work", false);

        let lines: Vec<_> = script.lines().collect();
        assert_eq!(lines[4], "cd crates/core");
        assert_eq!(lines[5], "export ALPHA='has space'");
        assert_eq!(lines[6], "export ZED=last");
        assert_eq!(lines[7], "cargo test");
    }

    #[test]
    fn test_dry_run_echoes_command() {
        let script = RemoteCommand::new(["make", "all"]).render("work", true);
        assert_eq!(script, "echo 'make all'");
    }

    #[test]
    fn test_raw_command_is_not_wrapped() {
        let command = RemoteCommand::raw("rm -rf .remotes/project_1234abcd");
        assert_eq!(
            command.render("ignored", false),
            "rm -rf .remotes/project_1234abcd"
        );
    }
}
