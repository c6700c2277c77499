use mdbook_d2_image::{run_preprocessor, D2ImagePreprocessor};

fn main() {
    run_preprocessor(&D2ImagePreprocessor);
}
