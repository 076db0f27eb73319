use data_playground::AppError;

#[test]
fn each_variant_has_its_own_prefix() {
    let cases = [
        (AppError::Config("x".into()), "config: x"),
        (AppError::Provisioning("x".into()), "provisioning: x"),
        (AppError::PipeCreation("x".into()), "pipe creation: x"),
        (AppError::InterpreterSpawn("x".into()), "interpreter spawn: x"),
        (AppError::Stream("x".into()), "stream: x"),
        (AppError::Protocol("x".into()), "protocol: x"),
        (AppError::Io("x".into()), "io: x"),
    ];
    for (err, expected) in cases {
        assert_eq!(err.to_string(), expected);
    }
}

#[test]
fn io_errors_convert() {
    let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe gone");
    let err: AppError = io.into();
    assert!(matches!(err, AppError::Io(ref msg) if msg == "pipe gone"));
}

#[test]
fn implements_std_error() {
    fn assert_error<E: std::error::Error>(_: &E) {}
    assert_error(&AppError::Stream("closed".into()));
}
