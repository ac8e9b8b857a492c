//! Execution contexts: how commands run and paths resolve per target kind.
//!
//! Every context kind shares one contract: `check_output` runs a command
//! with stderr merged into stdout, honoring the instance timeout when the
//! call supplies none; `locate_path` rewrites a path string without
//! touching the filesystem. Variants differ only in behavior, never in the
//! shape of the contract. `check_output` is the single override point for
//! changing how a command reaches the target: a container context wraps
//! commands in an image-exec prefix, archive contexts replay pre-captured
//! output without spawning anything.

pub mod paths;
pub mod runner;

pub use runner::{CallSpec, RunnerConfig};

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::sync::OnceLock;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use scout_common::{Error, Result};

/// Construction-time configuration shared by every context kind.
///
/// `root` and `timeout` are immutable after construction; `all_files` is
/// an enumeration hint of the files the target exposes, filled in by
/// upstream target detection.
#[derive(Debug, Clone)]
pub struct ExecSettings {
    root: PathBuf,
    timeout: Option<Duration>,
    all_files: Vec<PathBuf>,
}

impl Default for ExecSettings {
    fn default() -> Self {
        ExecSettings {
            root: PathBuf::from("/"),
            timeout: None,
            all_files: Vec::new(),
        }
    }
}

impl ExecSettings {
    pub fn new(root: impl Into<PathBuf>, timeout: Option<Duration>) -> Self {
        ExecSettings {
            root: root.into(),
            timeout,
            all_files: Vec::new(),
        }
    }

    pub fn with_all_files(mut self, all_files: Vec<PathBuf>) -> Self {
        self.all_files = all_files;
        self
    }

    /// Filesystem root or connection locator of the target.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Default command timeout for this target.
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Files the target is known to expose.
    pub fn all_files(&self) -> &[PathBuf] {
        &self.all_files
    }
}

/// Per-call execution parameters.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Override of the context's default timeout.
    pub timeout: Option<Duration>,

    /// Capture a non-zero exit status instead of failing the call.
    pub keep_rc: bool,

    /// Replacement environment; `None` inherits the process environment.
    pub env: Option<BTreeMap<String, String>>,
}

impl RunOptions {
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_keep_rc(mut self) -> Self {
        self.keep_rc = true;
        self
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = Some(env);
        self
    }
}

/// Raw command output; `exit_code` is set iff the call captured it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutput {
    pub exit_code: Option<i32>,
    pub output: String,
}

/// Line-split command output, ordering preserved as emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellOutput {
    pub exit_code: Option<i32>,
    pub lines: Vec<String>,
}

/// Live read handle onto a spawned process.
///
/// Dropping the stream kills and reaps the child, so the connection is
/// released on every exit path.
#[derive(Debug)]
pub struct ProcessStream {
    child: Child,
    stdout: Option<std::process::ChildStdout>,
}

impl ProcessStream {
    fn spawn(cmd: &str) -> Result<Self> {
        let argv = runner::split_words(cmd)?;
        let mut child = Command::new(&argv[0])
            .args(&argv[1..])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| Error::Spawn {
                command: cmd.to_string(),
                reason: e.to_string(),
            })?;
        let stdout = child.stdout.take();
        Ok(ProcessStream { child, stdout })
    }
}

impl Read for ProcessStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self.stdout.as_mut() {
            Some(stdout) => stdout.read(buf),
            None => Ok(0),
        }
    }
}

impl Drop for ProcessStream {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// The contract every target kind implements.
///
/// Default method bodies give live-host semantics; variants override
/// `check_output` to change how a command reaches their target and
/// `locate_path` to change how paths are rewritten.
pub trait ExecutionContext {
    fn settings(&self) -> &ExecSettings;

    /// Stable kind name, also used in the fs-roots catalog.
    fn kind(&self) -> &'static str;

    /// Run a command against the target, stderr merged into stdout.
    ///
    /// The override point: this is how a command actually reaches the
    /// target for this context kind.
    fn check_output(&self, cmd: &str, opts: &RunOptions) -> Result<RunOutput> {
        runner::call(
            cmd,
            &CallSpec {
                timeout: opts.timeout.or_else(|| self.settings().timeout()),
                keep_rc: opts.keep_rc,
                env: opts.env.clone(),
            },
        )
    }

    /// Line-split convenience over `check_output`; ordering is preserved
    /// exactly as emitted.
    fn shell_out(&self, cmd: &str, opts: &RunOptions) -> Result<ShellOutput> {
        let raw = self.check_output(cmd, opts)?;
        Ok(ShellOutput {
            exit_code: raw.exit_code,
            lines: raw.output.lines().map(str::to_string).collect(),
        })
    }

    /// Rewrite a path for this target. Deterministic, filesystem-free.
    fn locate_path(&self, path: &str) -> String {
        paths::expand_env(path)
    }

    /// Open a file under the target root for direct read access.
    fn stream(&self, path: &str) -> Result<BufReader<File>> {
        let full = self.settings().root().join(path.trim_start_matches('/'));
        debug!(path = %full.display(), "opening target file");
        Ok(BufReader::new(File::open(full)?))
    }

    /// Spawn a command and hand back a live read handle onto its output.
    fn connect(&self, cmd: &str) -> Result<ProcessStream> {
        ProcessStream::spawn(cmd)
    }
}

/// Recorded command output replayed by archive-rooted contexts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapturedCommands {
    entries: BTreeMap<String, CapturedOutput>,
}

/// One recorded invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturedOutput {
    pub exit_code: i32,
    pub output: String,
}

impl CapturedCommands {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, cmd: impl Into<String>, exit_code: i32, output: impl Into<String>) {
        self.entries.insert(
            cmd.into(),
            CapturedOutput {
                exit_code,
                output: output.into(),
            },
        );
    }

    pub fn get(&self, cmd: &str) -> Option<&CapturedOutput> {
        self.entries.get(cmd)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Replay a recording under the live-execution contract: `keep_rc`
/// captures the exit status, otherwise a non-zero recording fails the
/// same way a live command would.
fn replay(captured: &CapturedCommands, cmd: &str, opts: &RunOptions) -> Result<RunOutput> {
    let Some(recording) = captured.get(cmd) else {
        return Err(Error::NotCaptured {
            command: cmd.to_string(),
        });
    };

    if opts.keep_rc {
        Ok(RunOutput {
            exit_code: Some(recording.exit_code),
            output: recording.output.clone(),
        })
    } else if recording.exit_code != 0 {
        Err(Error::CommandFailed {
            command: cmd.to_string(),
            code: recording.exit_code,
            output: recording.output.clone(),
        })
    } else {
        Ok(RunOutput {
            exit_code: None,
            output: recording.output.clone(),
        })
    }
}

/// Live host: the tool runs directly on the target.
#[derive(Debug, Default)]
pub struct HostContext {
    settings: ExecSettings,
}

impl HostContext {
    pub fn new(settings: ExecSettings) -> Self {
        HostContext { settings }
    }
}

impl ExecutionContext for HostContext {
    fn settings(&self) -> &ExecSettings {
        &self.settings
    }

    fn kind(&self) -> &'static str {
        kinds::HOST
    }
}

/// Captured filesystem archive of a single host.
#[derive(Debug, Default)]
pub struct HostArchiveContext {
    settings: ExecSettings,
    captured: CapturedCommands,
}

impl HostArchiveContext {
    pub fn new(settings: ExecSettings, captured: CapturedCommands) -> Self {
        HostArchiveContext { settings, captured }
    }
}

impl ExecutionContext for HostArchiveContext {
    fn settings(&self) -> &ExecSettings {
        &self.settings
    }

    fn kind(&self) -> &'static str {
        kinds::HOST_ARCHIVE
    }

    fn check_output(&self, cmd: &str, opts: &RunOptions) -> Result<RunOutput> {
        replay(&self.captured, cmd, opts)
    }
}

/// SOS diagnostic report archive.
#[derive(Debug, Default)]
pub struct SosArchiveContext {
    settings: ExecSettings,
    captured: CapturedCommands,
}

impl SosArchiveContext {
    pub fn new(settings: ExecSettings, captured: CapturedCommands) -> Self {
        SosArchiveContext { settings, captured }
    }
}

impl ExecutionContext for SosArchiveContext {
    fn settings(&self) -> &ExecSettings {
        &self.settings
    }

    fn kind(&self) -> &'static str {
        kinds::SOS_ARCHIVE
    }

    fn check_output(&self, cmd: &str, opts: &RunOptions) -> Result<RunOutput> {
        replay(&self.captured, cmd, opts)
    }
}

/// Bundle of archives captured across a cluster.
#[derive(Debug, Default)]
pub struct ClusterArchiveContext {
    settings: ExecSettings,
    captured: CapturedCommands,
}

impl ClusterArchiveContext {
    pub fn new(settings: ExecSettings, captured: CapturedCommands) -> Self {
        ClusterArchiveContext { settings, captured }
    }
}

impl ExecutionContext for ClusterArchiveContext {
    fn settings(&self) -> &ExecSettings {
        &self.settings
    }

    fn kind(&self) -> &'static str {
        kinds::CLUSTER_ARCHIVE
    }

    fn check_output(&self, cmd: &str, opts: &RunOptions) -> Result<RunOutput> {
        replay(&self.captured, cmd, opts)
    }
}

/// Container image: commands run inside a throwaway container.
#[derive(Debug)]
pub struct DockerImageContext {
    settings: ExecSettings,
    image: String,
}

impl DockerImageContext {
    pub fn new(image: impl Into<String>, settings: ExecSettings) -> Self {
        DockerImageContext {
            settings,
            image: image.into(),
        }
    }

    pub fn image(&self) -> &str {
        &self.image
    }

    /// The image-exec wrapper prefixed onto every command.
    fn wrap(&self, cmd: &str) -> String {
        format!("docker run --rm {} {}", self.image, cmd)
    }
}

impl ExecutionContext for DockerImageContext {
    fn settings(&self) -> &ExecSettings {
        &self.settings
    }

    fn kind(&self) -> &'static str {
        kinds::DOCKER_IMAGE
    }

    fn check_output(&self, cmd: &str, opts: &RunOptions) -> Result<RunOutput> {
        runner::call(
            &self.wrap(cmd),
            &CallSpec {
                timeout: opts.timeout.or_else(|| self.settings().timeout()),
                keep_rc: opts.keep_rc,
                env: opts.env.clone(),
            },
        )
    }
}

/// Live host running an application server; host semantics apply.
#[derive(Debug, Default)]
pub struct JBossContext {
    settings: ExecSettings,
}

impl JBossContext {
    pub fn new(settings: ExecSettings) -> Self {
        JBossContext { settings }
    }
}

impl ExecutionContext for JBossContext {
    fn settings(&self) -> &ExecSettings {
        &self.settings
    }

    fn kind(&self) -> &'static str {
        kinds::JBOSS
    }
}

/// JDR diagnostic dump of an application server.
///
/// Dumps encode the server home differently from a live host: the literal
/// `$JBOSS_HOME` segment names a fixed `JBOSS_HOME` token inside the dump
/// rather than an environment variable, so path resolution substitutes
/// the token first and only then runs the generic expansion.
#[derive(Debug, Default)]
pub struct JdrContext {
    settings: ExecSettings,
}

impl JdrContext {
    pub fn new(settings: ExecSettings) -> Self {
        JdrContext { settings }
    }
}

impl ExecutionContext for JdrContext {
    fn settings(&self) -> &ExecSettings {
        &self.settings
    }

    fn kind(&self) -> &'static str {
        kinds::JDR
    }

    fn locate_path(&self, path: &str) -> String {
        let substituted = path.replace("$JBOSS_HOME", "JBOSS_HOME");
        paths::expand_env(&substituted)
    }
}

/// A specific compute node within an OpenStack deployment.
///
/// Hostname-scoped: unlike the root-scoped kinds above this context names
/// one remote node of a larger deployment, so the hostname is required at
/// construction.
#[derive(Debug)]
pub struct OpenStackContext {
    settings: ExecSettings,
    hostname: String,
}

impl OpenStackContext {
    pub fn new(hostname: impl Into<String>) -> Self {
        OpenStackContext {
            settings: ExecSettings::default(),
            hostname: hostname.into(),
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }
}

impl ExecutionContext for OpenStackContext {
    fn settings(&self) -> &ExecSettings {
        &self.settings
    }

    fn kind(&self) -> &'static str {
        kinds::OPENSTACK
    }
}

/// A specific node within an OpenShift cluster; hostname-scoped.
#[derive(Debug)]
pub struct OpenShiftContext {
    settings: ExecSettings,
    hostname: String,
}

impl OpenShiftContext {
    pub fn new(hostname: impl Into<String>) -> Self {
        OpenShiftContext {
            settings: ExecSettings::default(),
            hostname: hostname.into(),
        }
    }

    pub fn hostname(&self) -> &str {
        &self.hostname
    }
}

impl ExecutionContext for OpenShiftContext {
    fn settings(&self) -> &ExecSettings {
        &self.settings
    }

    fn kind(&self) -> &'static str {
        kinds::OPENSHIFT
    }
}

/// Kind names of the built-in context variants.
pub mod kinds {
    pub const HOST: &str = "host";
    pub const HOST_ARCHIVE: &str = "host_archive";
    pub const SOS_ARCHIVE: &str = "sos_archive";
    pub const CLUSTER_ARCHIVE: &str = "cluster_archive";
    pub const DOCKER_IMAGE: &str = "docker_image";
    pub const JBOSS: &str = "jboss";
    pub const JDR: &str = "jdr";
    pub const OPENSTACK: &str = "openstack";
    pub const OPENSHIFT: &str = "openshift";
}

/// Ordered catalog of filesystem-rooted context kinds.
///
/// Upstream target-type detection walks this to decide which kinds can
/// claim an on-disk target. Write-once at startup; the hostname-scoped
/// kinds are deliberately not listed.
#[derive(Debug, Default)]
pub struct FsRootRegistry {
    kinds: Vec<&'static str>,
}

impl FsRootRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog holding the built-in filesystem-rooted kinds.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        for kind in [
            kinds::HOST,
            kinds::HOST_ARCHIVE,
            kinds::SOS_ARCHIVE,
            kinds::CLUSTER_ARCHIVE,
            kinds::DOCKER_IMAGE,
            kinds::JBOSS,
            kinds::JDR,
        ] {
            registry.register(kind);
        }
        registry
    }

    /// Append a kind; duplicates are the caller's bug, not guarded here.
    pub fn register(&mut self, kind: &'static str) {
        self.kinds.push(kind);
    }

    pub fn kinds(&self) -> &[&'static str] {
        &self.kinds
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.kinds.iter().any(|k| *k == kind)
    }
}

/// The process-wide fs-roots catalog, frozen on first use.
pub fn fs_roots() -> &'static FsRootRegistry {
    static FS_ROOTS: OnceLock<FsRootRegistry> = OnceLock::new();
    FS_ROOTS.get_or_init(FsRootRegistry::builtin)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::BufRead;
    use std::io::Write;

    #[test]
    fn test_host_context_runs_commands() {
        let ctx = HostContext::default();
        let out = ctx
            .shell_out("sh -c 'echo alpha; echo beta'", &RunOptions::default())
            .unwrap();
        assert_eq!(out.lines, vec!["alpha", "beta"]);
        assert_eq!(out.exit_code, None);
    }

    #[test]
    fn test_host_context_keep_rc() {
        let ctx = HostContext::default();
        let out = ctx
            .check_output("sh -c 'exit 7'", &RunOptions::default().with_keep_rc())
            .unwrap();
        assert_eq!(out.exit_code, Some(7));
    }

    #[test]
    fn test_instance_timeout_applies_when_call_has_none() {
        let ctx = HostContext::new(ExecSettings::new("/", Some(Duration::from_millis(100))));
        let err = ctx
            .check_output("sleep 10", &RunOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
    }

    #[test]
    fn test_default_locate_path_expands_process_environment() {
        std::env::set_var("SCOUT_EXEC_TEST_HOME", "/opt/jboss");
        let ctx = HostContext::default();
        assert_eq!(
            ctx.locate_path("$SCOUT_EXEC_TEST_HOME/standalone/log"),
            "/opt/jboss/standalone/log"
        );
    }

    #[test]
    fn test_locate_path_idempotent_without_references() {
        let ctx = HostContext::default();
        let once = ctx.locate_path("/var/log/messages");
        assert_eq!(ctx.locate_path(&once), once);
    }

    #[test]
    fn test_jdr_locate_path_substitutes_token_before_expansion() {
        // A live JBoss host expands $JBOSS_HOME from the environment; the
        // dump variant rewrites the literal segment to the fixed token
        // first, so the environment never applies.
        std::env::set_var("JBOSS_HOME", "/opt/jboss");
        let live = JBossContext::default();
        assert_eq!(
            live.locate_path("$JBOSS_HOME/standalone/log"),
            "/opt/jboss/standalone/log"
        );

        let dump = JdrContext::default();
        assert_eq!(
            dump.locate_path("$JBOSS_HOME/standalone/log"),
            "JBOSS_HOME/standalone/log"
        );
    }

    #[test]
    fn test_archive_replay_matches_live_contract() {
        let mut captured = CapturedCommands::new();
        captured.record("uname -r", 0, "3.10.0-327.el7.x86_64\n");
        captured.record("systemctl status vdsmd", 3, "inactive\n");
        let ctx = SosArchiveContext::new(ExecSettings::default(), captured);

        let out = ctx.check_output("uname -r", &RunOptions::default()).unwrap();
        assert_eq!(out.output.trim(), "3.10.0-327.el7.x86_64");
        assert_eq!(out.exit_code, None);

        let err = ctx
            .check_output("systemctl status vdsmd", &RunOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::CommandFailed { code: 3, .. }));

        let kept = ctx
            .check_output(
                "systemctl status vdsmd",
                &RunOptions::default().with_keep_rc(),
            )
            .unwrap();
        assert_eq!(kept.exit_code, Some(3));
        assert_eq!(kept.output.trim(), "inactive");
    }

    #[test]
    fn test_archive_missing_recording_is_not_captured() {
        let ctx = HostArchiveContext::new(ExecSettings::default(), CapturedCommands::new());
        let err = ctx
            .check_output("lsmod", &RunOptions::default())
            .unwrap_err();
        assert!(matches!(err, Error::NotCaptured { .. }));
    }

    #[test]
    fn test_archive_shell_out_splits_replayed_lines() {
        let mut captured = CapturedCommands::new();
        captured.record("cat /proc/cmdline", 0, "ro root=/dev/sda\nquiet\n");
        let ctx = ClusterArchiveContext::new(ExecSettings::default(), captured);
        let out = ctx
            .shell_out("cat /proc/cmdline", &RunOptions::default())
            .unwrap();
        assert_eq!(out.lines, vec!["ro root=/dev/sda", "quiet"]);
    }

    #[test]
    fn test_docker_image_wraps_commands() {
        let ctx = DockerImageContext::new("rhel7:latest", ExecSettings::default());
        assert_eq!(
            ctx.wrap("cat /etc/redhat-release"),
            "docker run --rm rhel7:latest cat /etc/redhat-release"
        );
    }

    #[test]
    fn test_hostname_scoped_contexts_carry_hostname() {
        let osp = OpenStackContext::new("compute-0");
        assert_eq!(osp.hostname(), "compute-0");
        assert_eq!(osp.kind(), "openstack");

        let ocp = OpenShiftContext::new("node-1");
        assert_eq!(ocp.hostname(), "node-1");
        assert_eq!(ocp.kind(), "openshift");
    }

    #[test]
    fn test_fs_roots_catalog_excludes_hostname_scoped_kinds() {
        let catalog = fs_roots();
        assert!(catalog.contains(kinds::HOST));
        assert!(catalog.contains(kinds::JDR));
        assert!(!catalog.contains(kinds::OPENSTACK));
        assert!(!catalog.contains(kinds::OPENSHIFT));
        assert_eq!(catalog.kinds().len(), 7);
    }

    #[test]
    fn test_stream_opens_file_under_root() {
        let dir = tempfile::tempdir().unwrap();
        let etc = dir.path().join("etc");
        std::fs::create_dir_all(&etc).unwrap();
        let mut f = File::create(etc.join("redhat-release")).unwrap();
        writeln!(f, "Red Hat Enterprise Linux Server release 7.3").unwrap();

        let ctx = HostArchiveContext::new(
            ExecSettings::new(dir.path(), None),
            CapturedCommands::new(),
        );
        let mut reader = ctx.stream("/etc/redhat-release").unwrap();
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        assert!(line.starts_with("Red Hat Enterprise Linux"));
    }

    #[test]
    fn test_stream_missing_file_is_io_error() {
        let ctx = HostContext::new(ExecSettings::new("/nonexistent-scout-root", None));
        let err = ctx.stream("etc/hosts").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_connect_yields_live_output_and_reaps_on_drop() {
        let ctx = HostContext::default();
        let stream = ctx.connect("sh -c 'echo streamed; sleep 60'").unwrap();
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        reader.read_line(&mut line).unwrap();
        assert_eq!(line.trim(), "streamed");
        // Dropping the reader kills the still-sleeping child.
    }

    #[test]
    fn test_contexts_are_object_safe() {
        let contexts: Vec<Box<dyn ExecutionContext>> = vec![
            Box::new(HostContext::default()),
            Box::new(JdrContext::default()),
            Box::new(OpenStackContext::new("compute-0")),
        ];
        let kinds: Vec<_> = contexts.iter().map(|c| c.kind()).collect();
        assert_eq!(kinds, vec!["host", "jdr", "openstack"]);
    }
}
