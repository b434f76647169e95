//! Vendor device profiles: prompt/continuation patterns, post-login
//! initialization, default timeouts and the Telnet login-prompt patterns.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use netexpect_core::ConnectionMethod;
use regex::Regex;

/// A vendor tag identifying which [`DeviceProfile`] to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Vendor {
    CiscoIos,
    CiscoXr,
    Juniper,
    Casa,
    Foundry,
    Base,
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Vendor::CiscoIos => "cisco-ios",
            Vendor::CiscoXr => "cisco-xr",
            Vendor::Juniper => "juniper",
            Vendor::Casa => "casa",
            Vendor::Foundry => "foundry",
            Vendor::Base => "base",
        })
    }
}

/// Error returned by [`Vendor::from_str`] for an unrecognized vendor tag.
#[derive(Debug, Clone)]
pub struct UnknownVendor(pub String);

impl fmt::Display for UnknownVendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown device vendor tag: {:?}", self.0)
    }
}

impl std::error::Error for UnknownVendor {}

impl FromStr for Vendor {
    type Err = UnknownVendor;

    /// Accepts the vendor's canonical kebab-case tag plus a few spellings
    /// that show up in device rosters (`"ios"`, `"xr"`, `"default"`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cisco-ios" | "cisco_ios" | "ciscoios" | "ios" => Ok(Vendor::CiscoIos),
            "cisco-xr" | "cisco_xr" | "ciscoxr" | "xr" => Ok(Vendor::CiscoXr),
            "juniper" | "junos" => Ok(Vendor::Juniper),
            "casa" => Ok(Vendor::Casa),
            "foundry" => Ok(Vendor::Foundry),
            "base" | "default" => Ok(Vendor::Base),
            other => Err(UnknownVendor(other.to_string())),
        }
    }
}

/// A single paging-continuation rule: a pattern to test each incoming line
/// against, and the bytes to write when it matches.
#[derive(Clone)]
pub struct Continuation {
    pub pattern: Regex,
    pub reply: &'static str,
}

/// Per-vendor parameters wired together by the [`crate::manager::Manager`]
/// at connect time. Compiled once and immutable thereafter.
#[derive(Clone)]
pub struct DeviceProfile {
    pub vendor: Vendor,
    pub prompt: Regex,
    pub continuations: Vec<Continuation>,
    pub post_login_init: Vec<String>,
    pub default_timeout: Duration,
    /// Telnet-only: pattern identifying the login/username prompt. `None`
    /// for profiles that never use Telnet in practice (none today, but the
    /// factory keeps this optional rather than assuming every vendor logs
    /// in over Telnet).
    pub login_prompt: Option<Regex>,
    pub password_prompt: Regex,
    pub supported_methods: HashSet<ConnectionMethod>,
    /// Cipher suite override applied before the SSH handshake; `None` means
    /// use the library default negotiation.
    pub cipher_override: Option<Vec<String>>,
    pub pty: netexpect_ssh::PtyOptions,
}

const PROMPT_PATTERN: &str = r"> *$|# *$|\$ *$";
const PASSWORD_PROMPT: &str = r"^.*?[Pp]assword:? *?$";
const MORE_PROMPT: &str = r"^.*?--More-- $";

fn both_methods() -> HashSet<ConnectionMethod> {
    [ConnectionMethod::Ssh, ConnectionMethod::Telnet]
        .into_iter()
        .collect()
}

fn re(pattern: &str) -> Regex {
    Regex::new(pattern).expect("device profile pattern is a fixed, known-valid regex")
}

fn pty(cols: u32, rows: u32) -> netexpect_ssh::PtyOptions {
    netexpect_ssh::PtyOptions {
        cols,
        rows,
        ..netexpect_ssh::PtyOptions::default()
    }
}

impl DeviceProfile {
    /// Builds the profile for `vendor` per the vendor parameter table.
    pub fn for_vendor(vendor: Vendor) -> Self {
        let prompt = re(PROMPT_PATTERN);
        let password_prompt = re(PASSWORD_PROMPT);

        match vendor {
            Vendor::CiscoIos => DeviceProfile {
                vendor,
                prompt,
                continuations: vec![Continuation {
                    pattern: re(MORE_PROMPT),
                    reply: " \r",
                }],
                post_login_init: vec!["terminal length 0\r".to_string()],
                default_timeout: Duration::from_secs(10),
                login_prompt: Some(re(r".*?[Uu]sername:? *?$")),
                password_prompt,
                supported_methods: both_methods(),
                cipher_override: None,
                pty: pty(80, 40),
            },
            Vendor::CiscoXr => DeviceProfile {
                vendor,
                prompt,
                continuations: vec![Continuation {
                    pattern: re(MORE_PROMPT),
                    reply: " \r",
                }],
                post_login_init: vec![
                    "terminal length 0\r".to_string(),
                    "set length 0\r".to_string(),
                ],
                default_timeout: Duration::from_secs(8),
                login_prompt: Some(re(r".*?[Ll]ogin:? *?$")),
                password_prompt,
                supported_methods: both_methods(),
                cipher_override: None,
                pty: pty(100, 100),
            },
            Vendor::Juniper => DeviceProfile {
                vendor,
                prompt,
                continuations: vec![Continuation {
                    pattern: re(MORE_PROMPT),
                    reply: " \r",
                }],
                post_login_init: vec!["set cli screen-length 0\r".to_string()],
                default_timeout: Duration::from_secs(30),
                login_prompt: Some(re(r".*?[Ll]ogin:? *?$")),
                password_prompt,
                supported_methods: both_methods(),
                cipher_override: None,
                pty: pty(100, 100),
            },
            Vendor::Casa => DeviceProfile {
                vendor,
                prompt,
                continuations: vec![
                    Continuation {
                        pattern: re(r":\r$"),
                        reply: "\r",
                    },
                    Continuation {
                        pattern: re(":\x1B\\[K$"),
                        reply: "\r",
                    },
                ],
                post_login_init: vec!["page-off\r".to_string()],
                default_timeout: Duration::from_secs(8),
                login_prompt: Some(re(r".*?[Ll]ogin:? *?$")),
                password_prompt,
                supported_methods: both_methods(),
                // Casa's cipher list is restricted to algorithms its older
                // SSH stack still speaks.
                cipher_override: Some(vec![
                    "aes128-cbc".to_string(),
                    "aes256-cbc".to_string(),
                    "aes128-ctr".to_string(),
                    "aes192-ctr".to_string(),
                    "aes256-ctr".to_string(),
                    "aes128-gcm@openssh.com".to_string(),
                    "arcfour256".to_string(),
                    "arcfour128".to_string(),
                ]),
                // No RequestPty call for Casa survives in the reference
                // source (its Connect delegates to an embedded base type),
                // so it takes the other transport-package vendors' 100x100.
                pty: pty(100, 100),
            },
            Vendor::Foundry => DeviceProfile {
                vendor,
                prompt,
                continuations: vec![Continuation {
                    pattern: re(r"^--More--,"),
                    reply: " \r",
                }],
                // Foundry's paging-off command requires enable mode first;
                // out of scope for the core's post-login init step.
                post_login_init: Vec::new(),
                default_timeout: Duration::from_secs(30),
                login_prompt: Some(re(r".*?[Ll]ogin [Nn]ame:? *?$")),
                password_prompt,
                supported_methods: both_methods(),
                cipher_override: None,
                pty: pty(0, 80),
            },
            Vendor::Base => DeviceProfile {
                vendor,
                prompt,
                continuations: vec![
                    Continuation {
                        pattern: re(r":\r$"),
                        reply: "\r",
                    },
                    Continuation {
                        pattern: re(":\x1B\\[K$"),
                        reply: "\r",
                    },
                ],
                post_login_init: Vec::new(),
                default_timeout: Duration::from_secs(30),
                login_prompt: Some(re(r".*?[Ll]ogin:? *?$")),
                password_prompt,
                supported_methods: both_methods(),
                cipher_override: None,
                pty: pty(80, 40),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cisco_ios_prompt_matches_standard_prompts() {
        let profile = DeviceProfile::for_vendor(Vendor::CiscoIos);
        assert!(profile.prompt.is_match("router> "));
        assert!(profile.prompt.is_match("router# "));
        assert!(profile.prompt.is_match("user@host$ "));
    }

    #[test]
    fn casa_continuation_matches_colon_paging_prompt() {
        let profile = DeviceProfile::for_vendor(Vendor::Casa);
        assert!(profile.continuations[0].pattern.is_match("--More--:\r"));
    }

    #[test]
    fn foundry_has_no_post_login_init_commands() {
        let profile = DeviceProfile::for_vendor(Vendor::Foundry);
        assert!(profile.post_login_init.is_empty());
    }

    #[test]
    fn cisco_xr_runs_two_post_login_init_commands() {
        let profile = DeviceProfile::for_vendor(Vendor::CiscoXr);
        assert_eq!(
            profile.post_login_init,
            vec!["terminal length 0\r".to_string(), "set length 0\r".to_string()]
        );
    }

    #[test]
    fn default_timeouts_match_the_vendor_table() {
        assert_eq!(
            DeviceProfile::for_vendor(Vendor::CiscoIos).default_timeout,
            Duration::from_secs(10)
        );
        assert_eq!(
            DeviceProfile::for_vendor(Vendor::CiscoXr).default_timeout,
            Duration::from_secs(8)
        );
        assert_eq!(
            DeviceProfile::for_vendor(Vendor::Juniper).default_timeout,
            Duration::from_secs(30)
        );
        assert_eq!(
            DeviceProfile::for_vendor(Vendor::Casa).default_timeout,
            Duration::from_secs(8)
        );
        assert_eq!(
            DeviceProfile::for_vendor(Vendor::Foundry).default_timeout,
            Duration::from_secs(30)
        );
        assert_eq!(
            DeviceProfile::for_vendor(Vendor::Base).default_timeout,
            Duration::from_secs(30)
        );
    }

    #[test]
    fn vendor_from_str_accepts_canonical_and_alias_tags() {
        assert_eq!("cisco-ios".parse::<Vendor>().unwrap(), Vendor::CiscoIos);
        assert_eq!("ios".parse::<Vendor>().unwrap(), Vendor::CiscoIos);
        assert_eq!("CISCO-XR".parse::<Vendor>().unwrap(), Vendor::CiscoXr);
        assert_eq!("junos".parse::<Vendor>().unwrap(), Vendor::Juniper);
        assert_eq!("default".parse::<Vendor>().unwrap(), Vendor::Base);
    }

    #[test]
    fn vendor_from_str_rejects_unknown_tag() {
        assert!("arista".parse::<Vendor>().is_err());
    }

    #[test]
    fn vendor_display_round_trips_through_from_str() {
        for vendor in [
            Vendor::CiscoIos,
            Vendor::CiscoXr,
            Vendor::Juniper,
            Vendor::Casa,
            Vendor::Foundry,
            Vendor::Base,
        ] {
            let tag = vendor.to_string();
            assert_eq!(tag.parse::<Vendor>().unwrap(), vendor);
        }
    }

    #[test]
    fn pty_dimensions_vary_by_vendor() {
        let dims = |v| {
            let p = DeviceProfile::for_vendor(v).pty;
            (p.cols, p.rows)
        };
        assert_eq!(dims(Vendor::CiscoIos), (80, 40));
        assert_eq!(dims(Vendor::Base), (80, 40));
        assert_eq!(dims(Vendor::CiscoXr), (100, 100));
        assert_eq!(dims(Vendor::Juniper), (100, 100));
        assert_eq!(dims(Vendor::Casa), (100, 100));
        assert_eq!(dims(Vendor::Foundry), (0, 80));
    }

    #[test]
    fn casa_overrides_the_cipher_list() {
        let profile = DeviceProfile::for_vendor(Vendor::Casa);
        assert!(profile.cipher_override.is_some());
        assert!(profile
            .cipher_override
            .as_ref()
            .unwrap()
            .contains(&"arcfour128".to_string()));
    }
}
