fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let path = std::env::args().nth(1).unwrap_or_else(|| "test.mat".to_string());

    let mut mat = matwrite::create(&path)?;
    mat.write_array("a", &[1, 1], &[5.7f64])?;
    mat.write_array("b", &[2, 3], &[1.0f64, 4.0, 2.0, 5.0, 3.0, 6.0])?;
    mat.write_array("c", &[1, 4], &[1.5f32, 2.5, 3.5, 4.5])?;
    mat.close()?;

    println!("wrote {}", path);
    Ok(())
}
