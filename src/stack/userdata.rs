//! Worker boot script
//!
//! The script is a typed, ordered list of [`BootStep`]s rendered into a single
//! [`Value`] join. Runtime handles (bucket name, queue address, region) enter
//! only through [`WorkerHandles`], so a missing substitution is a compile error
//! rather than a broken instance.

use declarative::Value;
use serde_json::json;

const HOME: &str = "/home/ec2-user";
const AGENT_CONFIG: &str = "/opt/aws/amazon-cloudwatch-agent/etc/ssm_AmazonCloudWatch-linux.json";
const AGENT_CTL: &str = "/opt/aws/amazon-cloudwatch-agent/bin/amazon-cloudwatch-agent-ctl";
const REGION_SLOT: &str = "@@REGION@@";

/// Runtime values the boot script needs
#[derive(Debug, Clone)]
pub struct WorkerHandles {
    pub bucket_name: Value,
    pub queue_url: Value,
    pub region: Value,
}

/// One shell step of the boot script
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootStep {
    /// `yum update -y`
    UpdatePackages,
    /// `yum install -y ...`
    InstallPackages(Vec<&'static str>),
    /// `pip3 install ...`
    InstallPython(Vec<&'static str>),
    /// Copy `s3://<bucket>/<key>` into the home directory
    FetchFromBucket { bucket: Value, key: &'static str },
    /// `ln -snf <target> <link>`
    Link {
        target: &'static str,
        link: &'static str,
    },
    MakeDir(&'static str),
    Touch(&'static str),
    /// Write `contents` to `path` through a heredoc
    WriteFile {
        path: &'static str,
        contents: Value,
    },
    /// Any other literal command
    Run(String),
    ChangeDir(&'static str),
    MakeExecutable(&'static str),
    /// `export A=.. && export B=..` on one line
    Export(Vec<(&'static str, Value)>),
    Echo(&'static str),
}

impl BootStep {
    /// Script lines for this step
    fn lines(&self) -> Vec<Value> {
        match self {
            Self::UpdatePackages => vec![Value::str("yum update -y")],
            Self::InstallPackages(pkgs) => {
                vec![Value::str(format!("yum install -y {}", pkgs.join(" ")))]
            }
            Self::InstallPython(pkgs) => {
                vec![Value::str(format!("pip3 install {}", pkgs.join(" ")))]
            }
            Self::FetchFromBucket { bucket, key } => vec![Value::join([
                Value::str("aws s3 cp s3://"),
                bucket.clone(),
                Value::str(format!("/{key} {HOME}")),
            ])],
            Self::Link { target, link } => vec![Value::str(format!("ln -snf {target} {link}"))],
            Self::MakeDir(dir) => vec![Value::str(format!("mkdir -p {dir}"))],
            Self::Touch(path) => vec![Value::str(format!("touch {path}"))],
            Self::WriteFile { path, contents } => vec![
                Value::str(format!("bash -c \"cat>{path}\"<<EOF")),
                contents.clone(),
                Value::str("EOF"),
            ],
            Self::Run(command) => vec![Value::str(command.clone())],
            Self::ChangeDir(dir) => vec![Value::str(format!("cd {dir}"))],
            Self::MakeExecutable(file) => vec![Value::str(format!("chmod +x {file}"))],
            Self::Export(vars) => {
                let mut parts = Vec::new();
                for (i, (name, value)) in vars.iter().enumerate() {
                    let sep = if i == 0 { "" } else { " && " };
                    parts.push(Value::str(format!("{sep}export {name}=")));
                    parts.push(value.clone());
                }
                vec![Value::Join(parts)]
            }
            Self::Echo(text) => vec![Value::str(format!("echo {text}"))],
        }
    }
}

/// A Linux boot script
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserData {
    steps: Vec<BootStep>,
}

impl UserData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn step(mut self, step: BootStep) -> Self {
        self.steps.push(step);
        self
    }

    /// The queue worker's boot sequence
    ///
    /// Installs dependencies, pulls the worker scripts and the compiled media
    /// tool from the bucket, starts the telemetry agent, exports the queue
    /// address and region, then runs the worker once.
    pub fn for_worker(handles: &WorkerHandles) -> Self {
        let fetch = |key| BootStep::FetchFromBucket {
            bucket: handles.bucket_name.clone(),
            key,
        };

        Self::new()
            .step(BootStep::UpdatePackages)
            .step(BootStep::InstallPackages(vec![
                "libxcb",
                "amazon-cloudwatch-agent",
            ]))
            .step(BootStep::InstallPython(vec!["boto3", "requests"]))
            .step(fetch("resources/sqs_queue.py"))
            .step(fetch("resources/worker.py"))
            .step(fetch("resources/ffmpeg_artifact/FFmpeg/ffmpeg"))
            .step(BootStep::Link {
                target: "/usr/local/bin/voicefocus_demo",
                link: "/usr/bin/",
            })
            .step(BootStep::Link {
                target: "/home/ec2-user/ffmpeg",
                link: "/usr/bin/ffmpeg",
            })
            .step(BootStep::MakeDir("/usr/local/ffmpeg/bin/"))
            .step(BootStep::Link {
                target: "/home/ec2-user/ffmpeg",
                link: "/usr/local/ffmpeg/bin/ffmpeg",
            })
            .step(BootStep::MakeDir("/usr/share/collectd/"))
            .step(BootStep::Touch("/usr/share/collectd/types.db"))
            .step(BootStep::MakeDir("/opt/aws/amazon-cloudwatch-agent/etc"))
            .step(BootStep::Touch(AGENT_CONFIG))
            .step(BootStep::WriteFile {
                path: AGENT_CONFIG,
                contents: agent_config(&handles.region),
            })
            .step(BootStep::Run(format!(
                "{AGENT_CTL} -a fetch-config -m ec2 -s -c file:{AGENT_CONFIG}"
            )))
            .step(BootStep::ChangeDir(HOME))
            .step(BootStep::MakeExecutable("ffmpeg"))
            .step(BootStep::Export(vec![
                ("SQS_URL", handles.queue_url.clone()),
                ("AWS_REGION", handles.region.clone()),
                ("QUEUE_ADDRESS", handles.queue_url.clone()),
                ("REGION", handles.region.clone()),
            ]))
            .step(BootStep::Run("python3 -m worker".to_string()))
            .step(BootStep::Echo("\"worker exit success\""))
    }

    /// The script as one string expression, shebang first
    pub fn render(&self) -> Value {
        let mut parts = vec![Value::str("#!/bin/bash")];
        for line in self.steps.iter().flat_map(BootStep::lines) {
            parts.push(Value::str("\n"));
            parts.push(line);
        }
        Value::Join(parts)
    }

    /// The script encoded the way instances expect it
    pub fn to_base64(&self) -> Value {
        Value::base64(self.render())
    }
}

/// Telemetry agent config shipping the worker's debug log
fn agent_config(region: &Value) -> Value {
    let config = json!({
        "agent": {
            "metrics_collection_interval": 60,
            "region": REGION_SLOT,
            "run_as_user": "root",
        },
        "logs": {
            "logs_collected": {
                "files": {
                    "collect_list": [{
                        "file_path": "/home/ec2-user/debug.log",
                        "log_group_name": "VFAMI_debug_log",
                        "log_stream_name": "{instance_id}",
                    }],
                },
            },
        },
    });
    Value::interpolate(&config.to_string(), REGION_SLOT, region)
}

#[cfg(test)]
mod tests {
    use super::*;
    use declarative::{Environment, ParameterValues, Pseudo, Resolver};

    fn handles() -> WorkerHandles {
        WorkerHandles {
            bucket_name: Value::str("demo-111111111111-us-east-1"),
            queue_url: Value::str("https://sqs/queue"),
            region: Value::from(Pseudo::Region),
        }
    }

    fn render(user_data: &UserData) -> String {
        let values = ParameterValues::default();
        let env = Environment::new("111111111111", "us-east-1");
        Resolver::with_environment(&values, &env).render_text(&user_data.render())
    }

    #[test]
    fn test_worker_script_order() {
        let user_data = UserData::for_worker(&handles());
        assert_eq!(user_data.steps.len(), 21);

        let script = render(&user_data);
        let lines: Vec<&str> = script.lines().collect();
        assert_eq!(lines.len(), 24);
        assert_eq!(lines[0], "#!/bin/bash");
        assert_eq!(lines[1], "yum update -y");
        assert_eq!(lines[2], "yum install -y libxcb amazon-cloudwatch-agent");
        assert_eq!(lines[3], "pip3 install boto3 requests");
        assert_eq!(
            lines[4],
            "aws s3 cp s3://demo-111111111111-us-east-1/resources/sqs_queue.py /home/ec2-user"
        );
        assert_eq!(
            lines[6],
            "aws s3 cp s3://demo-111111111111-us-east-1/resources/ffmpeg_artifact/FFmpeg/ffmpeg /home/ec2-user"
        );
        assert_eq!(
            lines.last().copied(),
            Some("echo \"worker exit success\"")
        );
        assert!(lines.contains(&"python3 -m worker"));
    }

    #[test]
    fn test_exports_queue_and_region() {
        let script = render(&UserData::for_worker(&handles()));
        assert!(script.contains(
            "export SQS_URL=https://sqs/queue && export AWS_REGION=us-east-1 && export QUEUE_ADDRESS=https://sqs/queue && export REGION=us-east-1"
        ));
    }

    #[test]
    fn test_agent_config_heredoc_carries_region() {
        let script = render(&UserData::for_worker(&handles()));
        let lines: Vec<&str> = script.lines().collect();
        let start = lines
            .iter()
            .position(|l| l.starts_with("bash -c \"cat>"))
            .unwrap();
        assert_eq!(lines[start + 2], "EOF");

        let config: serde_json::Value = serde_json::from_str(lines[start + 1]).unwrap();
        assert_eq!(config["agent"]["region"], "us-east-1");
        assert_eq!(
            config["logs"]["logs_collected"]["files"]["collect_list"][0]["log_stream_name"],
            "{instance_id}"
        );
        assert!(lines[start + 3].starts_with(AGENT_CTL));
    }

    #[test]
    fn test_unresolved_handles_stay_symbolic() {
        let script = Resolver::symbolic().render_text(&UserData::for_worker(&handles()).render());
        assert!(script.contains("export AWS_REGION=${AWS::Region}"));
    }
}
