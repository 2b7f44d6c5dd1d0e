use std::env;

pub fn emit_link_flags(target_os: &str) {
  if let Ok(dir) = env::var("LIBPCAP_LIBDIR") {
    println!("cargo:rustc-link-search=native={dir}");
  }
  let lib = if target_os == "windows" { "wpcap" } else { "pcap" };
  println!("cargo:rustc-link-lib={lib}");
}
