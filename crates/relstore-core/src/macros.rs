/// Build a [`Props`](crate::db::Props) bag from `field => value` pairs.
///
/// ```ignore
/// let props = props! { "title" => "B1", "publisher" => 1 };
/// ```
#[macro_export]
macro_rules! props {
    () => {
        $crate::db::Props::new()
    };
    ($($field:expr => $value:expr),+ $(,)?) => {{
        let mut props = $crate::db::Props::new();
        $( props.insert($field, $value); )+
        props
    }};
}
