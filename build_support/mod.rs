pub mod link;

/// Targets whose `sockaddr` starts with a length byte.
const SA_LEN_TARGETS: &[&str] = &["macos", "ios", "freebsd", "dragonfly", "openbsd", "netbsd"];

pub fn run() {
  println!("cargo:rerun-if-env-changed=LIBPCAP_LIBDIR");
  println!("cargo::rustc-check-cfg=cfg(sa_len)");

  let target_os = std::env::var("CARGO_CFG_TARGET_OS").unwrap_or_default();
  if SA_LEN_TARGETS.contains(&target_os.as_str()) {
    println!("cargo:rustc-cfg=sa_len");
  }

  // Tests that only use the in-process backend can build without libpcap.
  if std::env::var_os("CARGO_FEATURE_LIBPCAP").is_none() {
    return;
  }

  link::emit_link_flags(&target_os);
}
