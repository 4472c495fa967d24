fn main() {
    slint_build::compile("ui/scanner.slint").expect("Slint build failed");
}
