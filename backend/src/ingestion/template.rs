//! Downloadable upload template.

pub const TEMPLATE_VERSION: u32 = 1;
pub const TEMPLATE_FILE_NAME: &str = "property_upload_template_v1.csv";

const TEMPLATE_CSV: &str = "\
title,description,property_type,listing_type,status,price,address,city,state,postal_code,bedrooms,bathrooms,area,amenities
Sunny two-bedroom apartment,Bright corner unit close to transit,apartment,rent,available,1850,12 Harbor View Rd,Portland,OR,97209,2,1.5,920,parking;gym;balcony
Family house with garden,,house,sale,,425000,48 Oak Lane,Austin,TX,78701,4,2.5,2350,garden;garage
";

pub fn template_bytes() -> &'static [u8] {
    TEMPLATE_CSV.as_bytes()
}
