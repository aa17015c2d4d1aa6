//! Output rendering: default, hosts-only, IPs-only and JSON lines.
//!
//! Every mode renders admitted resources to newline-delimited lines. The
//! same lines go to standard output and, when configured, to a file.

use crate::resource::{Admission, IdentityField, Resource};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

/// Which records JSON mode serializes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JsonShape {
    /// The resource as the provider returned it
    #[default]
    Original,
    /// The single-field records the dedup store derived from it
    Decomposed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Host name then every address, one per line
    #[default]
    Default,
    HostsOnly,
    IpsOnly,
    Json(JsonShape),
}

/// Hosts and addresses attributed to one provider
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Tally {
    pub hosts: usize,
    pub ips: usize,
}

impl Tally {
    pub fn add(&mut self, other: Tally) {
        self.hosts += other.hosts;
        self.ips += other.ips;
    }

    pub fn is_empty(&self) -> bool {
        self.hosts == 0 && self.ips == 0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Renderer {
    pub mode: OutputMode,
    pub exclude_private: bool,
}

impl Renderer {
    pub fn new(mode: OutputMode, exclude_private: bool) -> Self {
        Self {
            mode,
            exclude_private,
        }
    }

    /// Whether a field is shown under the active mode
    pub fn shows(&self, field: IdentityField) -> bool {
        if field.is_private() && self.exclude_private {
            return false;
        }
        match self.mode {
            OutputMode::HostsOnly => !field.is_ip(),
            OutputMode::IpsOnly => field.is_ip(),
            OutputMode::Default | OutputMode::Json(_) => true,
        }
    }

    /// Lines for one admitted resource
    pub fn render(&self, admission: &Admission) -> io::Result<Vec<String>> {
        match self.mode {
            OutputMode::Json(JsonShape::Original) => {
                // Nothing new survives exclusion: the record was already printed
                if self.visible(&admission.novel).is_empty() {
                    return Ok(Vec::new());
                }
                Ok(vec![serde_json::to_string(&self.visible(&admission.original))?])
            }
            OutputMode::Json(JsonShape::Decomposed) => admission
                .derived
                .iter()
                .filter(|r| r.populated_fields().all(|f| self.shows(f)))
                .map(|r| serde_json::to_string(r).map_err(io::Error::from))
                .collect(),
            OutputMode::Default | OutputMode::HostsOnly | OutputMode::IpsOnly => {
                Ok(self.plain_lines(&admission.novel))
            }
        }
    }

    /// Plain-text lines for the fields of a resource, host first then addresses
    pub fn plain_lines(&self, resource: &Resource) -> Vec<String> {
        IdentityField::RENDER_ORDER
            .into_iter()
            .filter(|f| self.shows(*f))
            .map(|f| resource.field(f))
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Count the hosts and addresses a resource carries under the active mode
    pub fn tally(&self, resource: &Resource) -> Tally {
        let mut tally = Tally::default();
        for field in resource.populated_fields().filter(|f| self.shows(*f)) {
            if field.is_ip() {
                tally.ips += 1;
            } else {
                tally.hosts += 1;
            }
        }
        tally
    }

    /// Copy of a resource with the fields hidden by exclusion cleared
    fn visible(&self, resource: &Resource) -> Resource {
        let mut record = resource.clone();
        if self.exclude_private {
            record.clear_field(IdentityField::PrivateIpv4);
            record.clear_field(IdentityField::PrivateIpv6);
        }
        record
    }
}

/// Writer that copies everything to standard output and an optional file
pub struct Tee {
    stdout: io::Stdout,
    file: Option<BufWriter<File>>,
}

impl Tee {
    pub fn stdout() -> Self {
        Self {
            stdout: io::stdout(),
            file: None,
        }
    }

    /// Also write to `path`, creating or truncating it
    pub fn with_file(path: &Path) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            stdout: io::stdout(),
            file: Some(BufWriter::new(file)),
        })
    }
}

impl Write for Tee {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stdout.write_all(buf)?;
        if let Some(file) = self.file.as_mut() {
            file.write_all(buf)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stdout.flush()?;
        if let Some(file) = self.file.as_mut() {
            file.flush()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::DedupStore;

    fn sample() -> Resource {
        Resource::new("aws", "prod")
            .with_public(true)
            .with_field(IdentityField::DnsName, "x.com")
            .with_field(IdentityField::PublicIpv4, "5.6.7.8")
            .with_field(IdentityField::PrivateIpv4, "10.0.0.1")
    }

    fn admit(resource: &Resource) -> Admission {
        DedupStore::new().admit_novel(resource).unwrap()
    }

    #[test]
    fn test_hosts_only() {
        let lines = Renderer::new(OutputMode::HostsOnly, false).render(&admit(&sample())).unwrap();
        assert_eq!(lines, vec!["x.com"]);
    }

    #[test]
    fn test_ips_only_with_private() {
        let lines = Renderer::new(OutputMode::IpsOnly, false).render(&admit(&sample())).unwrap();
        assert_eq!(lines, vec!["5.6.7.8", "10.0.0.1"]);
    }

    #[test]
    fn test_ips_only_excluding_private() {
        let lines = Renderer::new(OutputMode::IpsOnly, true).render(&admit(&sample())).unwrap();
        assert_eq!(lines, vec!["5.6.7.8"]);
    }

    #[test]
    fn test_default_mode_host_then_addresses() {
        let lines = Renderer::default().render(&admit(&sample())).unwrap();
        assert_eq!(lines, vec!["x.com", "5.6.7.8", "10.0.0.1"]);
    }

    #[test]
    fn test_json_original_is_one_line() {
        let lines = Renderer::new(OutputMode::Json(JsonShape::Original), false)
            .render(&admit(&sample()))
            .unwrap();
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with(
            r#"{"public":true,"dns_name":"x.com","public_ipv4":"5.6.7.8","private_ipv4":"10.0.0.1""#
        ));
    }

    #[test]
    fn test_json_decomposed_is_one_line_per_field() {
        let lines = Renderer::new(OutputMode::Json(JsonShape::Decomposed), true)
            .render(&admit(&sample()))
            .unwrap();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains(r#""dns_name":"x.com""#));
        assert!(lines[1].contains(r#""public_ipv4":"5.6.7.8""#));
    }

    #[test]
    fn test_json_original_excludes_private_fields() {
        let lines = Renderer::new(OutputMode::Json(JsonShape::Original), true)
            .render(&admit(&sample()))
            .unwrap();
        assert!(!lines[0].contains("10.0.0.1"));

        let private_only = Resource::single("aws", "", IdentityField::PrivateIpv4, "10.9.9.9");
        let lines = Renderer::new(OutputMode::Json(JsonShape::Original), true)
            .render(&admit(&private_only))
            .unwrap();
        assert!(lines.is_empty());
    }

    #[test]
    fn test_json_original_skips_record_whose_new_value_is_hidden() {
        let renderer = Renderer::new(OutputMode::Json(JsonShape::Original), true);
        let store = DedupStore::new();

        let host = Resource::single("aws", "", IdentityField::DnsName, "a.example.com");
        let first = store.admit_novel(&host).unwrap();
        assert_eq!(renderer.render(&first).unwrap().len(), 1);

        let with_private = host.clone().with_field(IdentityField::PrivateIpv4, "10.0.0.1");
        let second = store.admit_novel(&with_private).unwrap();
        assert!(renderer.render(&second).unwrap().is_empty());

        // Without exclusion the private address is new output
        let lines = Renderer::new(OutputMode::Json(JsonShape::Original), false)
            .render(&second)
            .unwrap();
        assert_eq!(lines.len(), 1);
    }

    #[test]
    fn test_tee_copies_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hosts.txt");

        let mut tee = Tee::with_file(&path).unwrap();
        writeln!(tee, "x.com").unwrap();
        tee.flush().unwrap();
        drop(tee);

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "x.com\n");
    }

    #[test]
    fn test_tee_fails_for_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Tee::with_file(&dir.path().join("missing").join("out.txt")).is_err());
    }

    #[test]
    fn test_tally_follows_mode() {
        let resource = sample();
        assert_eq!(Renderer::default().tally(&resource), Tally { hosts: 1, ips: 2 });
        assert_eq!(
            Renderer::new(OutputMode::Json(JsonShape::Original), true).tally(&resource),
            Tally { hosts: 1, ips: 1 }
        );
        assert_eq!(
            Renderer::new(OutputMode::HostsOnly, false).tally(&resource),
            Tally { hosts: 1, ips: 0 }
        );
    }

    #[test]
    fn test_empty_resource_renders_nothing() {
        let renderer = Renderer::default();
        assert!(renderer.plain_lines(&Resource::new("aws", "")).is_empty());
        assert!(renderer.tally(&Resource::new("aws", "")).is_empty());
    }
}
