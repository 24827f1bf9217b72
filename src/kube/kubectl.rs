// src/kube/kubectl.rs
use super::csr::CertificateSigningRequest;
use crate::cert::csr::CsrClient;
use crate::error::{PkiError, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

const CSR_API_PATH: &str = "/apis/certificates.k8s.io/v1/certificatesigningrequests";

/// `CsrClient` that shells out to `kubectl`.
#[derive(Debug, Clone)]
pub struct KubectlCsrClient {
    binary: String,
    kubeconfig: Option<String>,
}

impl Default for KubectlCsrClient {
    fn default() -> Self {
        Self::new("kubectl", None)
    }
}

impl KubectlCsrClient {
    pub fn new(binary: &str, kubeconfig: Option<&str>) -> Self {
        Self {
            binary: shellexpand::tilde(binary).to_string(),
            kubeconfig: kubeconfig.map(|path| shellexpand::tilde(path).to_string()),
        }
    }

    fn args<'a>(&'a self, args: &[&'a str]) -> Vec<&'a str> {
        let mut full = Vec::with_capacity(args.len() + 2);
        if let Some(kubeconfig) = &self.kubeconfig {
            full.push("--kubeconfig");
            full.push(kubeconfig.as_str());
        }
        full.extend_from_slice(args);
        full
    }

    /// Runs kubectl, feeding `stdin` if given, and returns stdout. A non-zero
    /// exit becomes a cluster error carrying stderr.
    async fn run(&self, args: &[&str], stdin: Option<&[u8]>) -> Result<String> {
        let args = self.args(args);
        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| PkiError::Cluster(format!("failed to run {}: {}", self.binary, e)))?;

        if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
            pipe.write_all(input).await?;
            pipe.shutdown().await?;
        }

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(PkiError::Cluster(format!(
                "kubectl {} failed: {}",
                args.join(" "),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[async_trait]
impl CsrClient for KubectlCsrClient {
    async fn create(&self, csr: &CertificateSigningRequest) -> Result<()> {
        let body = serde_json::to_vec(csr)?;
        self.run(&["create", "-f", "-"], Some(&body)).await?;
        Ok(())
    }

    async fn approve(&self, csr: &CertificateSigningRequest) -> Result<()> {
        let path = format!("{}/{}/approval", CSR_API_PATH, csr.name());
        let body = serde_json::to_vec(csr)?;
        self.run(&["replace", "--raw", path.as_str(), "-f", "-"], Some(&body))
            .await?;
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Option<CertificateSigningRequest>> {
        let stdout = self
            .run(&["get", "csr", name, "-o", "json", "--ignore-not-found"], None)
            .await?;
        if stdout.trim().is_empty() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_str(&stdout)?))
    }

    async fn delete(&self, name: &str) -> Result<bool> {
        let stdout = self
            .run(&["delete", "csr", name, "--ignore-not-found"], None)
            .await?;
        Ok(!stdout.trim().is_empty())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    // Records its arguments and stdin, then answers like kubectl would.
    const FAKE_KUBECTL: &str = r#"#!/bin/sh
dir=$(dirname "$0")
echo "$@" >> "$dir/calls"
case "$*" in
  *"get csr missing"*) exit 0 ;;
  *"get csr"*) cat "$dir/csr.json" ;;
  *"delete csr gone"*) exit 0 ;;
  *"delete csr"*) echo "certificatesigningrequest.certificates.k8s.io deleted" ;;
  *"create"*|*"replace"*) cat > "$dir/stdin.json" ;;
  *) echo "unexpected: $*" >&2; exit 1 ;;
esac
"#;

    fn install(dir: &TempDir) -> String {
        let path = dir.path().join("kubectl");
        fs::write(&path, FAKE_KUBECTL).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path.to_string_lossy().into_owned()
    }

    // A single test: concurrent spawns while another script is being written
    // can fail with ETXTBSY.
    #[tokio::test]
    async fn drives_kubectl() {
        let dir = TempDir::new().unwrap();
        let binary = install(&dir);
        let client = KubectlCsrClient::new(&binary, Some("/tmp/kubeconfig"));

        let mut csr = CertificateSigningRequest::new(
            "node-tls",
            "request",
            "kubernetes.io/kube-apiserver-client",
            vec!["client auth".to_string()],
            None,
        );
        client.create(&csr).await.unwrap();
        let sent: CertificateSigningRequest =
            serde_json::from_str(&fs::read_to_string(dir.path().join("stdin.json")).unwrap())
                .unwrap();
        assert_eq!(sent, csr);

        client.approve(&csr).await.unwrap();

        csr.set_certificate_pem("issued");
        fs::write(dir.path().join("csr.json"), serde_json::to_string(&csr).unwrap()).unwrap();
        let fetched = client.get("node-tls").await.unwrap().unwrap();
        assert_eq!(fetched.certificate_pem().unwrap().as_deref(), Some("issued"));
        assert!(client.get("missing").await.unwrap().is_none());

        assert!(client.delete("node-tls").await.unwrap());
        assert!(!client.delete("gone").await.unwrap());

        let calls = fs::read_to_string(dir.path().join("calls")).unwrap();
        let calls: Vec<&str> = calls.lines().collect();
        assert_eq!(calls[0], "--kubeconfig /tmp/kubeconfig create -f -");
        assert_eq!(
            calls[1],
            "--kubeconfig /tmp/kubeconfig replace --raw \
             /apis/certificates.k8s.io/v1/certificatesigningrequests/node-tls/approval -f -"
        );
        assert_eq!(
            calls[2],
            "--kubeconfig /tmp/kubeconfig get csr node-tls -o json --ignore-not-found"
        );

        let failing = KubectlCsrClient::new(&binary, None);
        let err = failing.run(&["version"], None).await.unwrap_err();
        assert_eq!(err.kind(), "cluster-error");
        assert!(err.to_string().contains("unexpected: version"));
    }
}
