//! Typed build specification for the artifact build job

use serde::Serialize;

/// Commands of one build phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Phase {
    pub commands: Vec<String>,
}

impl Phase {
    fn of(commands: &[&str]) -> Self {
        Self {
            commands: commands.iter().map(ToString::to_string).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Phases {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pre_build: Option<Phase>,
    pub build: Phase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub post_build: Option<Phase>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Artifacts {
    pub files: Vec<String>,
}

/// A complete build spec, serialized as the job's inline definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BuildSpec {
    pub version: String,
    pub phases: Phases,
    pub artifacts: Artifacts,
}

impl BuildSpec {
    /// Static media-tool build from the release/5.0 branch
    pub fn ffmpeg_static() -> Self {
        Self {
            version: "0.2".to_string(),
            phases: Phases {
                pre_build: Some(Phase::of(&[
                    "echo Clone ffmpeg repo from release/5.0 branch",
                    "git clone -b release/5.0 https://github.com/FFmpeg/FFmpeg.git",
                    "cd FFmpeg",
                ])),
                build: Phase::of(&[
                    "./configure --disable-asm --disable-debug --disable-shared --enable-static --disable-doc",
                    "make build",
                ]),
                post_build: Some(Phase::of(&["echo Build completed on `date`"])),
            },
            artifacts: Artifacts {
                files: vec!["FFmpeg/ffmpeg".to_string()],
            },
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
