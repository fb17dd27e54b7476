use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Small topology without key material
pub const NETWORK_TOPOLOGY: &str = r#"
project "network"

resource "aws:ec2/Vpc" "my-vpc" {
    cidr_block "10.0.0.0/16"
}

resource "aws:ec2/Subnet" "public-subnet" {
    vpc_id (ref)"my-vpc.id"
    cidr_block "10.0.1.0/24"
}

resource "aws:ec2/Instance" "master-node" {
    ami "ami-0c55b159cbfafe1f0"
    instance_type "t2.micro"
    subnet_id (ref)"public-subnet.id"
}

export "master_public_ip" (ref)"master-node.public_ip"
export "vpc_id" "my-vpc.id"
"#;

pub struct TestProject {
    pub root: TempDir,
}

impl TestProject {
    pub fn new() -> Self {
        let root = tempfile::tempdir().unwrap();
        Self { root }
    }

    pub fn write_skyflow_kdl(&self, content: &str) {
        fs::write(self.root.path().join("skyflow.kdl"), content).unwrap();
    }

    #[allow(dead_code)]
    pub fn write_local_kdl(&self, content: &str) {
        fs::write(self.root.path().join("skyflow.local.kdl"), content).unwrap();
    }

    #[allow(dead_code)]
    pub fn read(&self, relative: impl AsRef<Path>) -> String {
        fs::read_to_string(self.root.path().join(relative)).unwrap()
    }

    pub fn path(&self) -> PathBuf {
        self.root.path().to_path_buf()
    }
}

/// `sky` run against `project`, isolated from the caller's environment
pub fn sky(project: &TestProject) -> assert_cmd::Command {
    #[allow(deprecated)]
    let mut cmd = assert_cmd::Command::cargo_bin("sky").unwrap();
    cmd.current_dir(project.path())
        .arg("-C")
        .arg(project.path())
        .env_remove("SKYFLOW_PROJECT_ROOT")
        .env_remove("SKYFLOW_PARALLEL")
        .env_remove("RUST_LOG")
        .env("NO_COLOR", "1");
    cmd
}
