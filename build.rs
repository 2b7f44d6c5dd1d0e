mod build_support;

fn main() {
  build_support::run();
}
