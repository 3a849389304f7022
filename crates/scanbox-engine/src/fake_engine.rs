//! Shell-script stand-ins for the engine, for process-level tests.
//!
//! Each [`FakeEngine`] lives in its own temporary directory. Scripts record
//! their arguments to `args.log` and their environment to `env.log` in that
//! directory so tests can assert on how the engine was invoked.

use std::fs;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use tempfile::TempDir;

const SCRIPT_NAME: &str = "semgrep";

const ONE_SHOT_REPORT: &str = concat!(
    r#"printf '{"version":"1.99.0-fake","results":[{"check_id":"fake.dangerous-call","#,
    r#""path":"%s","start":{"line":2,"col":1},"end":{"line":2,"col":15},"#,
    r#""extra":{"message":"dangerous call in %s","severity":"ERROR","lines":"os.system(cmd)"}}],"#,
    r#""errors":[],"paths":{"scanned":[%s],"skipped":[]}}\n' "$first" "$first" "$scanned""#,
);

const SESSION_SCAN_REPLY: &str = concat!(
    r#"printf '{"jsonrpc":"2.0","id":%s,"result":"{\\"version\\":\\"1.99.0-fake\\","#,
    r#"\\"results\\":[{\\"check_id\\":\\"fake.session-call\\",\\"path\\":\\"%s\\","#,
    r#"\\"start\\":{\\"line\\":1,\\"col\\":1},\\"end\\":{\\"line\\":1,\\"col\\":2},"#,
    r#"\\"extra\\":{\\"message\\":\\"session finding\\",\\"severity\\":\\"WARNING\\"}}],"#,
    r#"\\"paths\\":{\\"scanned\\":[\\"%s\\"]}}"}\n' "$id" "$file" "$file""#,
);

const SLOW_SCAN_REPLY: &str = concat!(
    "sleep 2; ",
    r#"printf '{"jsonrpc":"2.0","id":%s,"result":"{\\"version\\":\\"1.99.0-fake\\","#,
    r#"\\"results\\":[],\\"paths\\":{\\"scanned\\":[\\"%s\\"]}}"}\n' "$id" "$file""#,
);

/// How a fake session engine answers `scanFiles` calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionBehaviour {
    /// Replies with a double-encoded report holding one finding.
    Healthy,
    /// Replies like [`Self::Healthy`] after a two second pause.
    Slow,
    /// Never replies, so calls time out.
    Silent,
    /// Replies with a JSON-RPC error object.
    EngineError,
    /// Replies with a line that is not JSON.
    Garbage,
    /// Rejects `--pro --version`, as an engine without session support does.
    NoProSupport,
}

/// A temporary executable impersonating the engine.
#[derive(Debug)]
pub struct FakeEngine {
    dir: TempDir,
    path: PathBuf,
}

impl FakeEngine {
    /// Writes a `/bin/sh` script with the given body.
    ///
    /// `@DIR@` in the body is replaced with the fake's directory.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from creating or writing the script.
    pub fn with_script(body: &str) -> io::Result<Self> {
        let dir = TempDir::new()?;
        let path = dir.path().join(SCRIPT_NAME);
        let dir_text = dir.path().display().to_string();
        let script = format!(
            "#!/bin/sh\nprintf '%s\\n' \"$@\" > '{dir_text}/args.log'\nenv > '{dir_text}/env.log'\n{}\n",
            body.replace("@DIR@", &dir_text)
        );
        fs::write(&path, script)?;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755))?;
        Ok(Self { dir, path })
    }

    /// An engine whose `scan` reports one finding on the first file of the
    /// target directory and lists every file as scanned.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from writing the script.
    pub fn scanning() -> io::Result<Self> {
        let body = format!(
            r#"if [ "$1" = "--version" ]; then echo "1.99.0-fake"; exit 0; fi
for last; do target="$last"; done
scanned=""
first=""
for f in $(find "$target" -type f | sort); do
  if [ -z "$first" ]; then first="$f"; fi
  if [ -n "$scanned" ]; then scanned="$scanned,"; fi
  scanned="$scanned\"$f\""
done
{ONE_SHOT_REPORT}"#
        );
        Self::with_script(&body)
    }

    /// An engine that prints `stderr` and exits with `status`.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from writing the script.
    pub fn failing(stderr: &str, status: i32) -> io::Result<Self> {
        let body = format!(
            "if [ \"$1\" = \"--version\" ]; then echo \"1.99.0-fake\"; exit 0; fi\nprintf '%s' '{stderr}' >&2\nexit {status}"
        );
        Self::with_script(&body)
    }

    /// An engine whose `scan` prints `stdout` and exits zero.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from writing the script.
    pub fn printing(stdout: &str) -> io::Result<Self> {
        let body = format!(
            "if [ \"$1\" = \"--version\" ]; then echo \"1.99.0-fake\"; exit 0; fi\nprintf '%s\\n' '{stdout}'"
        );
        Self::with_script(&body)
    }

    /// An engine that forks a long sleeper, records its pid in
    /// `grandchild.pid`, and waits on it.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from writing the script.
    pub fn hanging() -> io::Result<Self> {
        Self::with_script(
            "if [ \"$1\" = \"--version\" ]; then echo \"1.99.0-fake\"; exit 0; fi\nsleep 30 &\necho $! > '@DIR@/grandchild.pid'\nwait",
        )
    }

    /// An engine that runs a persistent line-protocol session.
    ///
    /// `authenticate` succeeds only for the token `good-token`.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from writing the script.
    pub fn session(behaviour: SessionBehaviour) -> io::Result<Self> {
        let pro_exit = if behaviour == SessionBehaviour::NoProSupport {
            "echo 'pro engine unavailable' >&2; exit 7"
        } else {
            "echo '1.99.0-fake (pro)'; exit 0"
        };
        let scan_reply = match behaviour {
            SessionBehaviour::Healthy | SessionBehaviour::NoProSupport => SESSION_SCAN_REPLY,
            SessionBehaviour::Slow => SLOW_SCAN_REPLY,
            SessionBehaviour::Silent => ":",
            SessionBehaviour::EngineError => {
                r#"printf '{"jsonrpc":"2.0","id":%s,"error":{"code":-32001,"message":"rule failed"}}\n' "$id""#
            }
            SessionBehaviour::Garbage => "echo 'this is not json'",
        };
        let body = format!(
            r#"if [ "$1" = "--pro" ] && [ "$2" = "--version" ]; then {pro_exit}; fi
if [ "$1" = "--version" ]; then echo "1.99.0-fake"; exit 0; fi
while IFS= read -r line; do
  id=$(printf '%s' "$line" | sed -n 's/^{{"jsonrpc":"2.0","id":\([0-9]*\).*/\1/p')
  case "$line" in
    *'"method":"authenticate"'*)
      case "$line" in
        *'"token":"good-token"'*) printf '{{"jsonrpc":"2.0","id":%s,"result":{{"authenticated":true}}}}\n' "$id" ;;
        *) printf '{{"jsonrpc":"2.0","id":%s,"result":{{"authenticated":false}}}}\n' "$id" ;;
      esac ;;
    *'"method":"scanFiles"'*)
      file=$(printf '%s' "$line" | sed -n 's/.*"file":"\([^"]*\)".*/\1/p')
      {scan_reply} ;;
    *'"method":"shutdown"'*)
      printf '{{"jsonrpc":"2.0","id":%s,"result":null}}\n' "$id"
      exit 0 ;;
  esac
done"#
        );
        Self::with_script(&body)
    }

    /// Path of the executable script.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Directory holding the script and its logs.
    #[must_use]
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Arguments of the most recent invocation, one per element.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from reading `args.log`.
    pub fn recorded_args(&self) -> io::Result<Vec<String>> {
        let text = fs::read_to_string(self.dir.path().join("args.log"))?;
        Ok(text.lines().map(str::to_owned).collect())
    }

    /// Environment of the most recent invocation, as `KEY=VALUE` lines.
    ///
    /// # Errors
    ///
    /// Returns any I/O error from reading `env.log`.
    pub fn recorded_env(&self) -> io::Result<String> {
        fs::read_to_string(self.dir.path().join("env.log"))
    }
}
