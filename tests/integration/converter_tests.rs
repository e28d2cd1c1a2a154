use super::*;
use regex::Regex;

const AMAZON_LINKS: &[&str] = &[
    "https://www.amazon.com.br/dp/B0CP31L73X",
    "https://www.amazon.com.br/Echo-Dot-5ª-geração/dp/B09B8VGCR8/ref=sr_1_1?keywords=echo+dot&qid=1717000000",
    "https://www.amazon.com.br/gp/product/B0BTXJ1Z6M?psc=1&tag=outro-20",
    "https://amazon.com.br/Monitor-Gamer-LG/dp/B0C1J2K3L4?th=1&linkCode=ll1",
    "https://www.amazon.com.br/gp/aw/d/B0D5QWERTY/",
    "https://www.amazon.com.br/exec/obidos/ASIN/B0ABCDEFGH/",
];

#[test]
fn test_amazon_links_keep_asin_and_tag() {
    let config = get_test_config();
    let converter = AffiliateConverter::new(&config.affiliate);
    let asin = Regex::new(r"B0[A-Z0-9]{8}").expect("valid regex");

    for link in AMAZON_LINKS {
        let expected_asin = asin.find(link).map(|m| m.as_str()).expect("fixture carries an ASIN");
        let converted = converter.canonicalize(link);

        assert!(
            converted.contains(&format!("/dp/{expected_asin}?tag=garimpeirogee-20")),
            "{link} became {converted}"
        );
        assert_eq!(converter.canonicalize(&converted), converted, "not idempotent for {link}");
    }
}

#[test]
fn test_canonicalize_is_idempotent_for_every_store() {
    let config = get_test_config();
    let converter = AffiliateConverter::new(&config.affiliate);
    let links = [
        "https://produto.mercadolivre.com.br/MLB-3456789012-ssd-nvme-1tb-_JM?polycard_client=search",
        "https://www.kabum.com.br/produto/461699/placa-de-video-rtx-4060?utm_source=promobit",
        "https://www.magazineluiza.com.br/notebook-acer-aspire-5/p/237896500/in/note/",
        "https://www.fastshop.com.br/web/p/d/SGSM-S24ULT256PRT_PRD/galaxy-s24-ultra",
        "https://shopee.com.br/Fone-Bluetooth-i.123.456",
        "https://www.exemplo.com.br/produto/1",
        "não é um link",
    ];

    for link in links {
        let once = converter.canonicalize(link);
        assert_eq!(converter.canonicalize(&once), once, "not idempotent for {link}");
    }
}

#[tokio::test]
async fn test_convert_batch_is_ordered() {
    let config = get_test_config();
    let converter = AffiliateConverter::new(&config.affiliate);
    let urls: Vec<String> = AMAZON_LINKS.iter().map(|s| s.to_string()).collect();

    let converted = converter.convert_batch(&urls).await;

    assert_eq!(converted.len(), urls.len());
    for (input, output) in urls.iter().zip(&converted) {
        assert_eq!(*output, converter.canonicalize(input));
    }
}
