//! Name case conversion.
//!
//! Handler names are CamelCase (`SinglePost`), template identifiers are
//! dashed (`single-post`), and resolution candidates are assembled from
//! dashed slugs (`hello-world` → `PageHelloWorld`).

use heck::ToKebabCase;

/// `SinglePost` → `single-post`, `HTMLPage` → `html-page`, `Error404` → `error404`.
pub fn camelcase_to_dashed(name: &str) -> String {
    name.to_kebab_case()
}

/// `hello-world` → `HelloWorld`.
///
/// Only the first letter of each dashed word is upper-cased; the rest of the
/// word is kept as is, so `my-FAQ` becomes `MyFAQ`.
pub fn dashed_to_camelcase(name: &str) -> String {
    name.split(['-', ' '])
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camelcase_to_dashed() {
        assert_eq!(camelcase_to_dashed("SinglePost"), "single-post");
        assert_eq!(camelcase_to_dashed("Index"), "index");
        assert_eq!(camelcase_to_dashed("ArchiveProductReview"), "archive-product-review");
        assert_eq!(camelcase_to_dashed("already-dashed"), "already-dashed");
    }

    #[test]
    fn test_dashed_to_camelcase() {
        assert_eq!(dashed_to_camelcase("hello-world"), "HelloWorld");
        assert_eq!(dashed_to_camelcase("post"), "Post");
        assert_eq!(dashed_to_camelcase("my-FAQ"), "MyFAQ");
        assert_eq!(dashed_to_camelcase("product_cat"), "Product_cat");
        assert_eq!(dashed_to_camelcase(""), "");
    }

    #[test]
    fn test_dashed_roundtrip_for_handler_names() {
        for name in ["SinglePost", "PageAbout", "TaxonomyGenreJazz"] {
            assert_eq!(dashed_to_camelcase(&camelcase_to_dashed(name)), name);
        }
    }
}
