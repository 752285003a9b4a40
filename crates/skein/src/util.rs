use std::fmt;

pub fn display_fn<F>(f: F) -> impl fmt::Display
where
    F: Fn(&mut fmt::Formatter<'_>) -> fmt::Result,
{
    struct DisplayFn<F> {
        f: F,
    }
    impl<F> fmt::Display for DisplayFn<F>
    where
        F: Fn(&mut fmt::Formatter<'_>) -> fmt::Result,
    {
        fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            (self.f)(formatter)
        }
    }
    DisplayFn { f }
}

/// Render a key as a quoted printable character when possible.
pub fn display_key(key: i64) -> impl fmt::Display {
    display_fn(move |f| match u8::try_from(key) {
        Ok(b) if b.is_ascii_graphic() => write!(f, "'{}'", b as char),
        _ => write!(f, "{}", key),
    })
}
